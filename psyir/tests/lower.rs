extern crate psyir;

use indoc::indoc;
use psyir::frontend::KernelSource;
use psyir::ir::Access;
use psyir::ir::ArgMeta;
use psyir::ir::GuardedNode;
use psyir::ir::NodeClass;
use psyir::ir::Scope;
use psyir::lower::kernel_schedule;
use psyir::shared::SharedExt;
use psyir::tester::Tester;
use std::panic::Location;

const KERNEL: &str = indoc! {"
    module axpy_mod
    contains
      subroutine axpy_code(x, y, n)
        real, dimension(:), intent(in) :: x
        real, dimension(:), intent(inout) :: y
        integer, intent(in) :: n
        integer :: i
        y(n) = 2.0 * x(n) + y(n)
        if (n > 1) y(1) = x(1)
        print *, y
      end subroutine axpy_code
    end module axpy_mod
"};

#[test]
fn lower_kernel_of_invoke() {
    Tester::init_tracing();
    let metadata = vec![
        ArgMeta::field(Access::Read),
        ArgMeta::field(Access::ReadWrite),
        ArgMeta::scalar(psyir::ir::ScalarType::Integer, Access::Read),
    ];
    let site = Tester::kernel("axpy_code", metadata, &["x", "y", "n"])
        .with_source(KernelSource::parse(KERNEL).unwrap());
    let invoke = Tester::invoke(vec![site], false);
    let kern = invoke.schedule().kern_calls()[0].clone();
    let guard = kern.rd();
    let schedule = kernel_schedule(guard.as_kern().unwrap()).unwrap();
    Tester::verify(&schedule);
    let expected = indoc! {"
        Schedule[name:'axpy_code']
          Assignment[]
            ArrayReference[name:'y']
              Reference[name:'n']
            BinaryOperation[operator:'+']
              BinaryOperation[operator:'*']
                Literal[value:'2.0']
                ArrayReference[name:'x']
                  Reference[name:'n']
              ArrayReference[name:'y']
                Reference[name:'n']
          If[]
            BinaryOperation[operator:'>']
              Reference[name:'n']
              Literal[value:'1']
            Assignment[]
              ArrayReference[name:'y']
                Literal[value:'1']
              ArrayReference[name:'x']
                Literal[value:'1']
          CodeBlock[1 statements]
    "};
    Tester::check_lines_exact(&schedule.view(), expected, Location::caller());
    assert_eq!(schedule.walk(NodeClass::Assignment).len(), 2);

    let guard = schedule.rd();
    let table = guard.as_kernel_schedule().unwrap().symbol_table();
    let args: Vec<&str> = table.argument_list().iter().map(|s| s.name()).collect();
    assert_eq!(args, vec!["x", "y", "n"]);
    let x = table.lookup("x").unwrap();
    assert!(x.is_input() && !x.is_output());
    let y = table.lookup("y").unwrap();
    assert!(y.is_input() && y.is_output());
    assert_eq!(table.lookup("i").unwrap().scope(), Scope::Local);
}

#[test]
fn kernel_without_source() {
    let metadata = vec![ArgMeta::field(Access::Write)];
    let invoke = Tester::invoke(vec![Tester::kernel("k_code", metadata, &["f"])], false);
    let kern = invoke.schedule().kern_calls()[0].clone();
    let guard = kern.rd();
    let err = kernel_schedule(guard.as_kern().unwrap()).unwrap_err();
    assert!(err.to_string().contains("kernel 'k_code' has no source"));
}
