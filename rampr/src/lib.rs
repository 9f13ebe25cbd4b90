//! Operator facade over the load-test engine: declarative YAML options,
//! report rendering and process exit codes.

mod exit_codes;
mod options;
mod output;
mod run;

pub use exit_codes::ExitCode;
pub use options::parse_options;
pub use output::{render_human, render_json};
pub use run::{RunOutcome, run_options, run_yaml};

pub use rampr_core::{
    Hooks, IterationCtx, IterationError, IterationFuture, LogFn, MetricKind, Options, Request,
    Requester, Response, RunReport, SetupError, TeardownError, Verdict, iteration_fn,
};
