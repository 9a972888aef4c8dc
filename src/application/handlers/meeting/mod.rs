//! Meeting handlers.
//!
//! # Commands
//!
//! - `CreateMeetingLinkCommand` - Schedule a calendar event with a Meet link

mod create_meeting_link;

pub use create_meeting_link::{CreateMeetingLinkCommand, CreateMeetingLinkHandler};
