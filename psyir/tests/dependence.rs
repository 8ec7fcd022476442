extern crate psyir;

use psyir::ir::Access;
use psyir::ir::ArgMeta;
use psyir::ir::GuardedNode;
use psyir::ir::Node;
use psyir::ir::NodeClass;
use psyir::shared::Shared;
use psyir::shared::SharedExt;
use psyir::tester::Tester;
use psyir::transform::MoveTrans;
use psyir::CallSite;
use psyir::TransArgs;
use psyir::Transformation;

fn copy(args: &[&str]) -> CallSite {
    let metadata = vec![ArgMeta::field(Access::Write), ArgMeta::field(Access::Read)];
    Tester::kernel("copy_code", metadata, args)
}

/// Arguments of the kernels below `nodes`, one string per kernel.
fn kernel_args(nodes: &[Shared<Node>]) -> Vec<String> {
    nodes
        .iter()
        .flat_map(|n| n.kern_calls())
        .map(|k| {
            let k = k.rd();
            let call = k.as_call().unwrap();
            let args: Vec<&str> = call.arguments().iter().map(|a| a.name()).collect();
            args.join(",")
        })
        .collect()
}

#[test]
fn loops_depend_on_earlier_writers() {
    Tester::init_tracing();
    // f2 = f1; f3 = f2; f4 = f1
    let invoke = Tester::invoke(
        vec![copy(&["f2", "f1"]), copy(&["f3", "f2"]), copy(&["f4", "f1"])],
        false,
    );
    let schedule = invoke.schedule();
    let loops = schedule.children();
    assert!(loops[0].backward_dependence().unwrap().is_none());
    let dependence = loops[1].backward_dependence().unwrap().unwrap();
    assert!(dependence.ptr_eq(&loops[0]));
    assert!(loops[2].backward_dependence().unwrap().is_none());
    let dependence = loops[0].forward_dependence().unwrap().unwrap();
    assert!(dependence.ptr_eq(&loops[1]));

    assert!(!loops[1].is_valid_location(&loops[0], "before").unwrap());
    assert!(loops[2].is_valid_location(&loops[0], "before").unwrap());
    let err = loops[1].is_valid_location(&loops[1], "after").unwrap_err();
    assert!(err.to_string().contains("would have no effect"));
}

#[test]
fn move_respects_dependencies() {
    Tester::init_tracing();
    let invoke = Tester::invoke(
        vec![copy(&["f2", "f1"]), copy(&["f3", "f2"]), copy(&["f4", "f1"])],
        false,
    );
    let schedule = invoke.schedule();
    let loops = schedule.children();
    let args = TransArgs::new(&loops[1]).with_location(&loops[0]);
    let err = MoveTrans.apply(&args).err().unwrap();
    assert!(err
        .to_string()
        .contains("as this breaks data dependencies for node 'Loop'"));
    assert_eq!(kernel_args(&schedule.children()), vec!["f2,f1", "f3,f2", "f4,f1"]);

    let args = TransArgs::new(&loops[2]).with_location(&loops[0]);
    MoveTrans.apply(&args).unwrap();
    Tester::verify(&schedule);
    assert_eq!(kernel_args(&schedule.children()), vec!["f4,f1", "f2,f1", "f3,f2"]);
}

#[test]
fn halo_exchange_precedes_its_reader() {
    Tester::init_tracing();
    let invoke = Tester::invoke(vec![copy(&["f2", "f1"]), copy(&["f3", "f2"])], true);
    let schedule = invoke.schedule();
    let halos = schedule.walk(NodeClass::HaloExchange);
    assert_eq!(halos.len(), 2);
    let reader = schedule.loops()[1].clone();
    // The halo exchange of f2 reads what the first loop writes and the
    // second loop reads the exchanged halo.
    let dependence = reader.backward_dependence().unwrap().unwrap();
    assert!(dependence.ptr_eq(&halos[1]));
    let dependence = halos[1].backward_dependence().unwrap().unwrap();
    assert!(dependence.ptr_eq(&schedule.loops()[0]));
    let args = TransArgs::new(&reader).with_location(&halos[1]);
    assert!(MoveTrans.validate(&args).is_err());
}
