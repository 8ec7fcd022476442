extern crate psyir;

use indoc::indoc;
use psyir::error_kind;
use psyir::ir::Access;
use psyir::ir::ArgInfo;
use psyir::ir::ArgMeta;
use psyir::ir::BuiltInKind;
use psyir::ir::GuardedNode;
use psyir::ir::ScalarType;
use psyir::targ3t::fortran::GenNode;
use psyir::tester::Tester;
use psyir::transform::ACCEnterDataTrans;
use psyir::transform::ACCLoopTrans;
use psyir::transform::ACCParallelTrans;
use psyir::transform::ColourTrans;
use psyir::transform::LoopFuseTrans;
use psyir::transform::OMPLoopTrans;
use psyir::transform::OMPParallelLoopTrans;
use psyir::transform::OMPParallelTrans;
use psyir::CallSite;
use psyir::Config;
use psyir::ErrorKind;
use psyir::Invoke;
use psyir::TransArgs;
use psyir::TransInfo;
use psyir::Transformation;
use std::panic::Location;

fn testkern(args: &[&str]) -> CallSite {
    let metadata = vec![
        ArgMeta::scalar(ScalarType::Real, Access::Read),
        ArgMeta::field(Access::Write),
        ArgMeta::field(Access::Read),
    ];
    Tester::kernel("testkern_code", metadata, args)
}

fn inckern(args: &[&str]) -> CallSite {
    let metadata = vec![ArgMeta::field(Access::Inc), ArgMeta::field(Access::Read)];
    Tester::kernel("inckern_code", metadata, args)
}

#[test]
fn fuse_and_parallelise() {
    Tester::init_tracing();
    let invoke = Tester::invoke(
        vec![testkern(&["a", "f1", "f2"]), testkern(&["a", "f3", "f2"])],
        false,
    );
    let schedule = invoke.schedule();
    let info = TransInfo::new();
    let fuse = info.get_trans_name("LoopFuseTrans").unwrap();
    let (schedule, _) = fuse.apply(&TransArgs::nodes(&schedule.children())).unwrap();
    Tester::verify(&schedule);
    let l = schedule.children()[0].clone();
    OMPParallelLoopTrans.apply(&TransArgs::new(&l)).unwrap();
    let expected = indoc! {"
        Schedule[invoke='invoke_0']
          Directive[OMP parallel do]
            Loop[type='',field_space='any_space_1',it_space='cells']
              KernCall testkern_code(a,f1,f2) [module_inline=false]
              KernCall testkern_code(a,f3,f2) [module_inline=false]
    "};
    Tester::check_lines_exact(&schedule.view(), expected, Location::caller());

    let actual = Tester::gen(&invoke);
    let expected = indoc! {"
        subroutine invoke_0(a, f1, f2, f3)
          !$omp parallel do default(shared), private(cell), schedule(static)
          do cell = 1, cells_end
            call testkern_code(a, f1, f2)
            call testkern_code(a, f3, f2)
          end do
          !$omp end parallel do
        end subroutine invoke_0
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn parallel_region_with_orphan_loops() {
    Tester::init_tracing();
    let invoke = Tester::invoke(
        vec![testkern(&["a", "f1", "f2"]), testkern(&["a", "f3", "f2"])],
        false,
    );
    let schedule = invoke.schedule();
    for l in schedule.children() {
        let args = TransArgs::new(&l).with_omp_schedule("dynamic");
        OMPLoopTrans.apply(&args).unwrap();
    }
    OMPParallelTrans
        .apply(&TransArgs::nodes(&schedule.children()))
        .unwrap();
    Tester::verify(&schedule);
    let actual = Tester::gen(&invoke);
    let expected = indoc! {"
        !$omp parallel default(shared), private(cell)
        !$omp do schedule(dynamic)
        do cell = 1, cells_end
          call testkern_code(a, f1, f2)
        end do
        !$omp end do
        !$omp do schedule(dynamic)
        do cell = 1, cells_end
          call testkern_code(a, f3, f2)
        end do
        !$omp end do
        !$omp end parallel
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn colour_before_parallelising_increments() {
    Tester::init_tracing();
    let invoke = Tester::invoke(vec![inckern(&["f1", "f2"])], false);
    let schedule = invoke.schedule();
    let l = schedule.children()[0].clone();
    let err = OMPParallelLoopTrans
        .apply(&TransArgs::new(&l))
        .err()
        .unwrap();
    assert_eq!(error_kind(&err), Some(ErrorKind::Usage));
    assert!(err.to_string().contains("must be coloured"));
    // A rejected transformation leaves the tree as it was.
    assert!(schedule.children()[0].ptr_eq(&l));

    ColourTrans.apply(&TransArgs::new(&l)).unwrap();
    let inner = schedule.loops()[1].clone();
    OMPParallelLoopTrans.apply(&TransArgs::new(&inner)).unwrap();
    Tester::verify(&schedule);
    let expected = indoc! {"
        Schedule[invoke='invoke_0_inckern_code']
          Loop[type='colours',field_space='any_space_1',it_space='colours']
            Directive[OMP parallel do]
              Loop[type='colour',field_space='any_space_1',it_space='colour']
                KernCall inckern_code(f1,f2) [module_inline=false]
    "};
    Tester::check_lines_exact(&schedule.view(), expected, Location::caller());
    let actual = Tester::gen(&invoke);
    let expected = indoc! {"
        do colour = 1, ncolour
          !$omp parallel do default(shared), private(cell), schedule(static)
          do cell = 1, ncp_colour(colour)
            call inckern_code(f1, f2)
          end do
          !$omp end parallel do
        end do
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn openacc_offload() {
    Tester::init_tracing();
    let invoke = Tester::invoke(vec![testkern(&["a", "f1", "f2"])], false);
    let schedule = invoke.schedule();
    let l = schedule.children()[0].clone();
    ACCLoopTrans.apply(&TransArgs::new(&l)).unwrap();
    ACCParallelTrans
        .apply(&TransArgs::new(&schedule.children()[0]))
        .unwrap();
    ACCEnterDataTrans.apply(&TransArgs::new(&schedule)).unwrap();
    Tester::verify(&schedule);
    let actual = Tester::gen(&invoke);
    let expected = indoc! {"
        logical, save :: first_time = .True.
        ! Ensure all fields are on the device and
        ! copy them over if not.
        if (first_time) then
          !$acc enter data copyin(f1,f2)
          first_time = .false.
        end if
        call acc_update_device(a, 1)
        !$acc parallel default(present)
        !$acc loop independent
        do cell = 1, cells_end
          call testkern_code(a, f1, f2)
        end do
        !$acc end parallel
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn undo_restores_schedule() {
    Tester::init_tracing();
    let invoke = Tester::invoke(
        vec![testkern(&["a", "f1", "f2"]), testkern(&["a", "f3", "f2"])],
        false,
    );
    let schedule = invoke.schedule();
    let before = schedule.view();
    let loops = schedule.loops();
    let (_, memento) = LoopFuseTrans.apply(&TransArgs::nodes(&loops)).unwrap();
    assert_ne!(schedule.view(), before);
    memento.undo();
    Tester::verify(&schedule);
    assert_eq!(schedule.view(), before);
}

#[test]
fn halo_exchanges_block_fusion() {
    Tester::init_tracing();
    let invoke = Tester::invoke(
        vec![testkern(&["a", "f1", "f2"]), testkern(&["a", "f3", "f2"])],
        true,
    );
    let schedule = invoke.schedule();
    let loops = schedule.loops();
    let err = LoopFuseTrans.validate(&TransArgs::nodes(&loops)).unwrap_err();
    assert!(err.to_string().contains("not siblings who are next to each other"));
    let err = OMPParallelTrans
        .validate(&TransArgs::nodes(&schedule.children()))
        .unwrap_err();
    assert!(err.to_string().contains("'HaloExchange' cannot be enclosed"));
}

fn sum(scalar: &str, field: &str) -> CallSite {
    CallSite::builtin(BuiltInKind::SumX)
        .with_args(vec![ArgInfo::variable(scalar), ArgInfo::variable(field)])
}

/// Invoke of one sum whose loop is in an OpenMP parallel region.
fn parallel_sum(config: &Config, reprod: Option<bool>) -> Invoke {
    let invoke = Invoke::new(vec![sum("asum", "f1")], 0, config, None).unwrap();
    let schedule = invoke.schedule();
    let l = schedule.children()[0].clone();
    let args = match reprod {
        Some(reprod) => TransArgs::new(&l).with_reprod(reprod),
        None => TransArgs::new(&l),
    };
    OMPLoopTrans.apply(&args).unwrap();
    OMPParallelTrans
        .apply(&TransArgs::new(&schedule.children()[0]))
        .unwrap();
    Tester::verify(&schedule);
    invoke
}

#[test]
fn reproducible_reductions_from_config() {
    Tester::init_tracing();
    let config = Config::default()
        .with_distributed_memory(false)
        .with_reproducible_reductions(true)
        .with_reprod_pad_size(4);
    let invoke = parallel_sum(&config, None);
    assert!(invoke.schedule().view().contains("Directive[OMP do][reprod=true]"));
    let actual = Tester::gen(&invoke);
    let expected = indoc! {"
        real(kind=r_def), allocatable :: l_asum(:,:)
        asum = 0.0_r_def
        nthreads = omp_get_max_threads()
        allocate (l_asum(4,nthreads))
        l_asum = 0.0_r_def
        !$omp parallel default(shared)
        th_idx = omp_get_thread_num()+1
        !$omp do schedule(static)
        l_asum(1,th_idx) = l_asum(1,th_idx) + f1%data(cell)
        !$omp end do
        !$omp end parallel
        do th_idx = 1, nthreads
          asum = asum + l_asum(1,th_idx)
        end do
        deallocate (l_asum)
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());
    assert!(!actual.contains("reduction(+:asum)"));

    // An explicit setting on the transformation wins over the policy.
    let actual = Tester::gen(&parallel_sum(&config, Some(false)));
    assert!(actual.contains("!$omp do schedule(static), reduction(+:asum)"));
    assert!(!actual.contains("l_asum"));
}

#[test]
fn reproducible_reductions_need_padding() {
    Tester::init_tracing();
    let config = Config::default()
        .with_distributed_memory(false)
        .with_reproducible_reductions(true)
        .with_reprod_pad_size(0);
    let invoke = parallel_sum(&config, None);
    let module = GenNode::module("psy");
    let err = invoke.gen_code(&module).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::SemanticViolation));
    assert!(err
        .to_string()
        .contains("REPROD_PAD_SIZE should be a positive integer, but it is set to '0'."));
}
