pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod limits;
pub mod ports;
pub mod recorder;
pub mod schedule;
pub mod stats;

#[cfg(test)]
mod testing;

pub use domain::{
    Cadence, CheckIn, CheckInStatus, Frequency, NewPact, Pact, PactStatus, Participant,
    RoastRequest, RoastThread, RoastThreadStatus, ScheduleSpec, SubscriptionTier, WeekdaySet,
};
pub use error::{EngineError, EngineResult};
pub use lifecycle::DueVerdict;
pub use limits::{PactCeiling, PactLimit};
pub use ports::{
    IdentityService, PactStore, PortError, PortResult, RoastQueue, RoastThreadService,
    SubscriptionService,
};
pub use recorder::{CheckInPolicy, CheckInRecorder, CheckInRequest, RecordedCheckIn};
pub use stats::{MissedDayPolicy, PactStats, ParticipantStats, StatsPolicy};
