//! # Chamber Control Library
//!
//! Drives an environmental chamber's temperature and humidity toward operator
//! setpoints through the PLC's holding registers, never exceeding the
//! configured setpoint and rate envelopes.
//!
//! ## Components
//!
//! 1. **BoundsValidator** - pure accept / reject / not-applicable verdicts
//! 2. **RampController** - stepwise convergence of one process variable,
//!    clamped so it never crosses the target
//! 3. **ChamberLifecycle** - start/stop gated by a device state read
//! 4. **ControlSession** - fresh read, validation, then sequential ramps
//! 5. **OperatorConsole** - menu loop over any line-based input
//!
//! ## Device Access
//!
//! Every component receives the same `SharedPort` in its constructor. The
//! port mutex serializes operations: one ramp, start or stop at a time.

pub mod bounds;
pub mod cancel;
pub mod console;
pub mod error;
pub mod lifecycle;
pub mod probe;
pub mod ramp;
pub mod session;

pub use crate::bounds::{BoundsValidator, RejectReason, Verdict};
pub use crate::cancel::CancelToken;
pub use crate::console::OperatorConsole;
pub use crate::error::ControlError;
pub use crate::lifecycle::{ChamberLifecycle, LifecycleAction, LifecycleReport, Outcome};
pub use crate::probe::{ChamberProbe, ProcessSnapshot, ThermocoupleStatus};
pub use crate::ramp::{
    RampController, RampOutcome, RampRequest, RampStatus, Sleeper, ThreadSleeper, next_value,
};
pub use crate::session::{
    AdjustPlan, AdjustReport, AdjustRequest, ControlSession, RateSpec, VariableOutcome,
    VariablePlan,
};
