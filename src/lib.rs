//! Reader and writer for `LMT` motion containers.
//!
//! A [`Container`] holds a list of optional [`Animation`]s. Each animation
//! owns bone [`Track`]s whose keyframes are stored by one of fourteen
//! quantizing [`Codec`]s, plus optional [`Events`] and [`FloatTracks`].
//! Every binary record is described by a layout from a [`LayoutRegistry`],
//! which is passed to each load call.
//!
//! ```no_run
//! use lmt::{Container, LayoutRegistry};
//!
//! # fn main() -> lmt::Result<()> {
//! let registry = LayoutRegistry::default();
//! let container = Container::load(&registry, std::fs::read("motion.lmt")?)?;
//! for anim in container.animations().iter().flatten() {
//!     println!("{} tracks, {} frames", anim.tracks().len(), anim.num_frames());
//! }
//! let bytes = container.save()?;
//! # Ok(())
//! # }
//! ```

pub mod animation;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod event;
pub mod fixup;
pub mod float_track;
pub mod layout;
pub mod read;
mod standalone;
pub mod track;
pub mod write;

pub type Vector = cgmath::Vector4<f32>;

pub use nom::number::Endianness;

pub use animation::Animation;
pub use codec::{Codec, CodecKind, MinMax};
pub use config::{ExportSettings, ImportOverrides, Settings};
pub use container::Container;
pub use error::{Error, Properties, Result};
pub use event::{EventValue, Events};
pub use float_track::FloatTracks;
pub use layout::{Architecture, LayoutRegistry};
pub use track::{Track, TrackType};
