/*!
# tac_analysis

Fixed-point analyses over a three-address intermediate representation (IR)
of a class-based object-oriented language with virtual dispatch, arrays,
instance/static fields and primitive integer arithmetic.

The crate consumes an immutable [`Program`] built through the checked
[`ProgramBuilder`](intermediate_representation::ProgramBuilder) API
(the IR itself is produced by an external front end) and offers:

* **Intraprocedural constant propagation**
  ([`analysis::constant_propagation`]) on the three-point lattice
  `UNDEF ⊑ CONST(n) ⊑ NAC`, via the generic work-list solver in
  [`analysis::dataflow`].
* **Live-variable analysis** ([`analysis::liveness`]) and
  **dead-code detection** ([`analysis::dead_code`]),
  combining unreachable-code and dead-assignment reasoning.
* **Class-hierarchy call graph construction** ([`analysis::callgraph`]).
* **Context-sensitive pointer analysis** with on-the-fly call graph
  construction and a taint-tracking overlay ([`analysis::pointer`]).
* **Interprocedural constant propagation**
  ([`analysis::inter_constant_propagation`]) consuming pointer analysis
  results to reason through fields and arrays.

All engines are single-threaded and compute their fixed points
synchronously; outputs that are observable (dead-code sets, taint flows)
use ordered containers so that results are deterministic across runs.
*/

use crate::analysis::callgraph::{build_cha, CallGraph};
use crate::analysis::pointer::context::ContextSelector;
use crate::analysis::pointer::taint::TaintConfig;
use crate::analysis::pointer::PointerAnalysisResult;
use crate::intermediate_representation::Program;

pub mod analysis;
pub mod intermediate_representation;
pub mod utils;

mod prelude {
    pub use anyhow::{anyhow, Error};
    pub use serde::{Deserialize, Serialize};
}

/// A struct bundling the analysis results that may be needed as input for
/// other analyses.
#[derive(Clone, Copy)]
pub struct AnalysisResults<'a> {
    /// The program under analysis.
    pub program: &'a Program,
    /// The class-hierarchy call graph, if already computed.
    pub call_graph: Option<&'a CallGraph>,
    /// The result of the pointer analysis, if already computed.
    pub pointer_analysis: Option<&'a PointerAnalysisResult>,
}

impl<'a> AnalysisResults<'a> {
    /// Create a new `AnalysisResults` struct with only the program known.
    pub fn new(program: &'a Program) -> AnalysisResults<'a> {
        AnalysisResults {
            program,
            call_graph: None,
            pointer_analysis: None,
        }
    }

    /// Compute the class-hierarchy call graph from the program's entry
    /// method. Returns `None` if the program declares no entry.
    /// The result gets returned, but not saved to the struct itself.
    pub fn compute_call_graph(&self) -> Option<CallGraph> {
        self.program
            .main_method()
            .map(|main| build_cha(self.program, main))
    }

    /// Create a new struct containing the given call graph.
    pub fn set_call_graph(self, call_graph: Option<&'a CallGraph>) -> AnalysisResults<'a> {
        AnalysisResults { call_graph, ..self }
    }

    /// Compute the pointer analysis from the program's entry method.
    /// Returns `None` if the program declares no entry.
    /// The result gets returned, but not saved to the struct itself.
    pub fn compute_pointer_analysis(
        &self,
        selector: &dyn ContextSelector,
        taint_config: TaintConfig,
    ) -> Option<PointerAnalysisResult> {
        self.program
            .main_method()
            .map(|main| analysis::pointer::run(self.program, main, selector, taint_config))
    }

    /// Create a new struct containing the given pointer analysis results.
    pub fn set_pointer_analysis(
        self,
        pointer_analysis: Option<&'a PointerAnalysisResult>,
    ) -> AnalysisResults<'a> {
        AnalysisResults {
            pointer_analysis,
            ..self
        }
    }
}
