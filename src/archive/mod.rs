//! Archive layer: manifest, time index and channel access.
//!
//! ```text
//!  manifest text
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ Manifest │  (file_ref, start, duration) rows
//!   └──────────┘
//!        │  restrict to window
//!        ▼
//!   ┌────────────┐
//!   │ FrameIndex │  sorted disjoint segments → file refs
//!   └────────────┘
//!        │  intersect request
//!        ▼
//!   ┌───────────────┐      ┌───────────────┐
//!   │ SegmentLocator│ ───▶ │ ChannelReader │  samples per channel
//!   └───────────────┘      └───────────────┘
//! ```
pub mod channel;
pub mod index;
pub mod locator;
pub mod manifest;
pub mod segment;
