pub mod appointment;
pub mod blocked;
pub mod client;
pub mod staff;

pub use appointment::{Appointment, AppointmentStatus, ArchivedAppointment, ServiceKind};
pub use blocked::{BlockReason, BlockedInterval};
pub use client::{ClientNote, ClientRecord};
pub use staff::{Staff, WorkingHours};
