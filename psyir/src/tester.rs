use crate::init_subscriber;
use crate::ir::ArgInfo;
use crate::ir::ArgMeta;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::targ3t::fortran::GenNode;
use crate::CallSite;
use crate::Config;
use crate::Invoke;
use std::cmp::max;
use std::panic::Location;
use tracing::info;

pub struct Tester;

impl Tester {
    /// Initialize the subscriber for the tests.
    ///
    /// Cannot pass options, since the tests run concurrently.
    pub fn init_tracing() {
        let level = tracing::Level::INFO;
        match init_subscriber(level) {
            Ok(_) => (),
            Err(_e) => (),
        }
    }
    fn point_to_missing_line(expected: &str, index: usize) -> String {
        let mut result = String::new();
        result.push_str("A line is missing from the output:\n");
        result.push_str("```");
        for (i, line) in expected.lines().enumerate() {
            if i == index {
                let msg = format!("{line}   <== missing");
                result.push_str(&format!("\n{msg}"));
            } else {
                result.push_str(&format!("\n{line}"));
            }
        }
        result.push_str("\n```");
        result
    }
    pub fn check_lines_exact(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let l = max(actual.lines().count(), expected.lines().count());
        for i in 0..l {
            let actual_line = match actual.lines().nth(i) {
                None => panic!("Expected line {i} not found in output: called from {caller}"),
                Some(actual_line) => actual_line,
            };
            let expected_line = match expected.lines().nth(i) {
                None => panic!("Unexpected line {i} in output: called from {caller}"),
                Some(expected_line) => expected_line,
            };
            assert_eq!(actual_line, expected_line, "called from {}", caller);
        }
    }
    /// Check whether the expected lines are present in the actual output.
    ///
    /// The actual output may contain additional lines that are not in the expected output.
    pub fn check_lines_contain(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let mut actual_index = 0;
        'outer: for (i, expected_line) in expected.lines().enumerate() {
            let expected_line = expected_line.trim();
            // If not skipping these, an empty line will match any line (which
            // can then cause the next expected line to be reported as missing).
            if expected_line.is_empty() {
                continue;
            }
            for (j, actual_line) in actual.lines().enumerate().skip(actual_index) {
                if actual_line.contains(expected_line) {
                    actual_index = j + 1;
                    continue 'outer;
                }
            }
            let msg = Self::point_to_missing_line(expected, i);
            panic!("{msg}\nwhen called from {caller}");
        }
    }
    fn print_heading(msg: &str, src: &str) {
        info!("{msg}:\n```\n{src}\n```\n");
    }
    /// Call site of a kernel whose arguments are plain variables named as
    /// in `args`.
    pub fn kernel(name: &str, metadata: Vec<ArgMeta>, args: &[&str]) -> CallSite {
        let module_name = match name.strip_suffix("_code") {
            Some(base) => format!("{base}_mod"),
            None => format!("{name}_mod"),
        };
        let args = args.iter().map(|a| ArgInfo::variable(a)).collect();
        CallSite::kernel(name, &module_name, metadata).with_args(args)
    }
    /// Invoke 0 of `call_sites`, with or without distributed memory.
    pub fn invoke(call_sites: Vec<CallSite>, distributed_memory: bool) -> Invoke {
        let config = Config::default().with_distributed_memory(distributed_memory);
        let invoke = Invoke::new(call_sites, 0, &config, None).unwrap();
        Self::print_heading("Schedule", &invoke.schedule().view());
        Self::verify(&invoke.schedule());
        invoke
    }
    /// Fortran text of the subroutine generated for `invoke`.
    pub fn gen(invoke: &Invoke) -> String {
        let module = GenNode::module("psy_test");
        let sub = invoke.gen_code(&module).unwrap();
        let actual = sub.rd().to_string();
        Self::print_heading("Generated", &actual);
        actual
    }
    fn verify_core(parent: &Shared<Node>, child: &Shared<Node>, index: usize) {
        let actual = child.parent();
        assert!(
            actual.is_some_and(|p| p.ptr_eq(parent)),
            "node without (correct) parent:\n{}",
            child.view()
        );
        assert_eq!(child.position(), index, "wrong position of\n{}", child.view());
    }
    /// Run some extra verification on the tree.
    ///
    /// Whether a node is in the child list of its parent is visible in the
    /// view, but whether the node also points back to that parent is not.
    pub fn verify(node: &Shared<Node>) {
        for (index, child) in node.children().iter().enumerate() {
            Self::verify_core(node, child, index);
            Self::verify(child);
        }
    }
}
