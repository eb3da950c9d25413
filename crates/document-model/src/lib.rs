//! Framecast Document Model
//!
//! Defines the parts of a design document that export scheduling depends on:
//! - **Document:** ordered pages plus document-level audio tracks
//! - **Element:** a typed tree of video, audio, group and opaque nodes
//! - **Timeline:** page start times, total duration, active-page lookup
//!
//! Everything else in a document is carried through untouched so the
//! renderer receives the same JSON it was given, apart from rewritten
//! media sources.

pub mod document;
pub mod element;
pub mod timeline;

pub use document::*;
pub use element::*;
pub use timeline::*;
