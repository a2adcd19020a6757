//! Vela Middle-End - IR Analyses and Optimizations
//!
//! This crate sits between the front end and the C emitter. It receives a
//! typed [`vela_ir::Module`], checks it, optimizes it in place, and computes
//! the GC tables the emitter needs to generate collector-aware code.
//!
//! # Architecture
//!
//! The pipeline is:
//! 1. Initialization analysis (errors reject the module)
//! 2. Constant propagation (including constant upvalues across functions)
//! 3. Static-call inlining
//! 4. Renormalize hoisting out of counted loops
//! 5. GC-check movement and coalescing
//! 6. GC rooting information for the emitter
//!
//! Every analysis is an instance of the worklist framework in [`dataflow`].
//! Passes run sequentially on one thread and may be re-invoked freely.

pub mod const_prop;
pub mod dataflow;
pub mod diagnostic;
pub mod error;
pub mod gc_info;
pub mod inline;
pub mod renorm;
pub mod uninit;

use std::io;

use vela_ir::Module;

pub use diagnostic::Diagnostic;
pub use error::AnalysisError;
pub use gc_info::GcInfo;

/// Counters accumulated across the transform passes
#[derive(Debug, Clone, Copy, Default)]
pub struct PassStats {
    /// GC checks re-inserted at a new position
    pub moved_checkgc: u32,
    /// GC checks deleted outright (coalesced or absorbed by a call)
    pub removed_checkgc: u32,
    /// Per-iteration renormalizes eliminated by hoisting
    pub renormalizes: u32,
    /// Static calls expanded by the inliner
    pub inlined_calls: u32,
}

impl PassStats {
    /// Write the benchmark counters to `sink`, one per line
    pub fn report<W: io::Write>(&self, sink: &mut W) -> io::Result<()> {
        writeln!(sink, "moved checkgc: {}", self.moved_checkgc)?;
        writeln!(sink, "removed checkgc: {}", self.removed_checkgc)?;
        writeln!(sink, "renormalizes: {}", self.renormalizes)
    }
}

/// Everything the middle-end hands to the C emitter besides the module itself
#[derive(Debug, Default)]
pub struct MiddleEndOutput {
    /// Per-function GC tables, parallel to `module.functions`
    pub gc_info: Vec<GcInfo>,
    /// Pass counters for diagnostics
    pub stats: PassStats,
}

/// Run the full middle-end over a module.
///
/// On error the module is returned unchanged apart from nothing: the
/// initialization check runs first and mutates nothing, and a non-empty
/// error list skips every later pass.
pub fn run(module: &mut Module) -> Result<MiddleEndOutput, Vec<AnalysisError>> {
    let errors = uninit::check_module(module);
    if !errors.is_empty() {
        return Err(errors);
    }

    const_prop::run(module);

    let mut stats = PassStats {
        inlined_calls: inline::run(module),
        ..PassStats::default()
    };

    for func in &mut module.functions {
        stats.renormalizes += renorm::run(func);
        let (moved, removed) = gc_info::move_gc_checks(func);
        stats.moved_checkgc += moved;
        stats.removed_checkgc += removed;
    }

    let gc_info = module.functions.iter().map(gc_info::compute).collect();

    Ok(MiddleEndOutput { gc_info, stats })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_report_format() {
        let stats = PassStats {
            moved_checkgc: 2,
            removed_checkgc: 5,
            renormalizes: 1,
            inlined_calls: 3,
        };
        let mut out = Vec::new();
        stats.report(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "moved checkgc: 2\nremoved checkgc: 5\nrenormalizes: 1\n"
        );
    }

    #[test]
    fn test_empty_module_runs() {
        let mut module = Module::new();
        let output = run(&mut module).unwrap();
        assert!(output.gc_info.is_empty());
        assert_eq!(output.stats.inlined_calls, 0);
    }
}
