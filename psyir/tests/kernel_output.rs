extern crate psyir;

use indoc::indoc;
use psyir::error_kind;
use psyir::frontend::KernelSource;
use psyir::ir::Access;
use psyir::ir::ArgInfo;
use psyir::ir::ArgMeta;
use psyir::ir::GuardedNode;
use psyir::ir::ScalarType;
use psyir::tester::Tester;
use psyir::transform::ACCRoutineTrans;
use psyir::CallSite;
use psyir::Config;
use psyir::ErrorKind;
use psyir::Invoke;
use psyir::KernelNaming;
use psyir::TransArgs;
use psyir::Transformation;
use std::fs;
use std::panic::Location;
use std::path::PathBuf;

const KERNEL: &str = indoc! {"
    module testkern_mod
      type, extends(kernel_type) :: testkern_type
      contains
        procedure, nopass :: code => testkern_code
      end type testkern_type
    contains
      subroutine testkern_code(a, f1)
        real, intent(in) :: a
        real, dimension(:), intent(inout) :: f1
        f1(1) = a
      end subroutine testkern_code
    end module testkern_mod
"};

/// Empty directory that is unique to the test `name`.
fn output_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("psyir-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn testkern() -> CallSite {
    let metadata = vec![
        ArgMeta::scalar(ScalarType::Real, Access::Read),
        ArgMeta::field(Access::Write),
    ];
    let source = KernelSource::parse(KERNEL).unwrap();
    Tester::kernel("testkern_code", metadata, &["a", "f1"]).with_source(source)
}

/// Invoke with one kernel that has `routines` OpenACC routine directives.
fn transformed(config: &Config, routines: usize) -> Invoke {
    let invoke = Invoke::new(vec![testkern()], 0, config, None).unwrap();
    let kern = invoke.schedule().kern_calls()[0].clone();
    for _ in 0..routines {
        ACCRoutineTrans.apply(&TransArgs::new(&kern)).unwrap();
    }
    invoke
}

#[test]
fn write_renamed_kernel() {
    Tester::init_tracing();
    let dir = output_dir("write_renamed_kernel");
    let config = Config::default()
        .with_distributed_memory(false)
        .with_kernel_output_dir(dir.clone());
    let invoke = transformed(&config, 1);
    let actual = Tester::gen(&invoke);
    let expected = indoc! {"
        subroutine invoke_0_testkern_code(a, f1)
          use testkern_0_mod, only: testkern_0_code
          do cell = 1, cells_end
            call testkern_0_code(a, f1)
          end do
        end subroutine invoke_0_testkern_code
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());

    let written = fs::read_to_string(dir.join("testkern_0_mod.f90")).unwrap();
    let expected = indoc! {"
        module testkern_0_mod
          type, extends(kernel_type) :: testkern_0_type
            procedure, nopass :: code => testkern_0_code
          end type testkern_0_type
          subroutine testkern_0_code(a, f1)
            !$acc routine
            real, intent(in) :: a
          end subroutine testkern_0_code
        end module testkern_0_mod
    "};
    Tester::check_lines_contain(&written, expected, Location::caller());

    // Every transformed kernel gets its own file.
    let invoke = transformed(&config, 1);
    Tester::gen(&invoke);
    assert!(dir.join("testkern_1_mod.f90").exists());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn untransformed_kernel_is_not_written() {
    Tester::init_tracing();
    let dir = output_dir("untransformed_kernel_is_not_written");
    let config = Config::default()
        .with_distributed_memory(false)
        .with_kernel_output_dir(dir.clone());
    let invoke = transformed(&config, 0);
    let actual = Tester::gen(&invoke);
    assert!(actual.contains("call testkern_code(a, f1)"));
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn single_naming_reuses_identical_kernel() {
    Tester::init_tracing();
    let dir = output_dir("single_naming_reuses_identical_kernel");
    let config = Config::default()
        .with_distributed_memory(false)
        .with_kernel_output_dir(dir.clone())
        .with_kernel_naming(KernelNaming::Single);
    Tester::gen(&transformed(&config, 1));
    let actual = Tester::gen(&transformed(&config, 1));
    assert!(actual.contains("call testkern_0_code(a, f1)"));
    assert!(!dir.join("testkern_1_mod.f90").exists());

    let module = psyir::targ3t::fortran::GenNode::module("psy");
    let err = transformed(&config, 2).gen_code(&module).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::ResourceConflict));
    assert!(err.to_string().contains("already exists in the kernel-output directory"));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn upper_case_kernel_names() {
    Tester::init_tracing();
    let dir = output_dir("upper_case_kernel_names");
    let config = Config::default()
        .with_distributed_memory(false)
        .with_kernel_output_dir(dir.clone());
    let metadata = vec![
        ArgMeta::scalar(ScalarType::Real, Access::Read),
        ArgMeta::field(Access::Write),
    ];
    let source = KernelSource::parse(&KERNEL.to_uppercase()).unwrap();
    let call = CallSite::kernel("TESTKERN_CODE", "TESTKERN_MOD", metadata)
        .with_args(vec![ArgInfo::variable("a"), ArgInfo::variable("f1")])
        .with_source(source);
    let invoke = Invoke::new(vec![call], 0, &config, None).unwrap();
    let kern = invoke.schedule().kern_calls()[0].clone();
    ACCRoutineTrans.apply(&TransArgs::new(&kern)).unwrap();
    let actual = Tester::gen(&invoke);
    let expected = indoc! {"
        use TESTKERN_0_mod, only: TESTKERN_0_code
        call TESTKERN_0_code(a, f1)
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());

    let written = fs::read_to_string(dir.join("TESTKERN_0_mod.f90")).unwrap();
    let expected = indoc! {"
        MODULE TESTKERN_0_mod
          TYPE, EXTENDS(KERNEL_TYPE) :: TESTKERN_0_type
            PROCEDURE, NOPASS :: CODE => TESTKERN_0_code
          SUBROUTINE TESTKERN_0_code(A, F1)
            !$acc routine
        END MODULE TESTKERN_0_mod
    "};
    Tester::check_lines_contain(&written, expected, Location::caller());
    assert!(!written.contains("_CODE_0_code"));
    fs::remove_dir_all(&dir).unwrap();
}
