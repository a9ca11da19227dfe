//! Protocol code enums.
//!
//! The RAINS wire format identifies algorithms, object types, notification
//! kinds, query options, and section types through small integers. This
//! module provides one enum per code space. Every enum keeps unknown values
//! in an `Int` variant so that codes from a newer protocol revision survive
//! a round trip through this implementation.

#[macro_use]
mod macros;

pub use self::notification::NotificationType;
pub use self::object::ObjectType;
pub use self::queryopt::QueryOpt;
pub use self::section::SectionType;
pub use self::sigalg::SigAlg;
pub use self::space::KeySpace;

mod notification;
mod object;
mod queryopt;
mod section;
mod sigalg;
mod space;
