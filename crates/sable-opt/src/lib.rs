//! sable-opt — the local-optimization core of the sable mid-level IR
//! optimizer.
//!
//! Three tightly coupled pieces:
//!
//! - [`combine`]: a worklist-driven instruction combiner performing
//!   fixed-point peephole rewriting over the SSA graph.
//! - [`inline`]: one-shot expansion of a call site into the callee's
//!   control-flow graph.
//! - [`cost`]: the inline cost model consulted before deciding to inline.
//!
//! The decision of *whether* to inline belongs to the driving pass manager;
//! this crate answers *how much it costs* and performs the splice. The
//! combiner is typically re-run after inlining to clean up the spliced
//! code, and a dead-code/dead-store pass is expected to run afterwards to
//! reclaim the scratch some rewrites deliberately leave behind.

pub mod combine;
pub mod cost;
pub mod inline;

pub use combine::{combine_function, CombineOptions, Rewrite};
pub use cost::{function_cost, instruction_cost, InlineCost, COST_NOT_INLINABLE};
pub use inline::{inline_function, InlineKind};

use anyhow::{Context, Result};
use sable_ir::Module;

/// Run the combiner over every function in the module.
pub fn optimize_module(module: &mut Module, options: &CombineOptions) -> Result<()> {
    let funcs: Vec<_> = module.function_ids().collect();
    for f in funcs {
        let name = module.func(f).name.clone();
        combine_function(module, f, options)
            .with_context(|| format!("failed to combine {name}"))?;
    }
    Ok(())
}
