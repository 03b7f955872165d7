//! Binary layouts of every record kind, keyed by pointer width and format
//! version.
//!
//! Field offsets are computed once with [`LayoutBuilder`], which applies the
//! same natural alignment rules the engine's compiler used. The resulting
//! descriptors are plain data, so a single reader and writer per record kind
//! serves every version.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::animation::Animation;
use crate::codec::CompressionTable;
use crate::error::{Error, Properties, Result};
use crate::event::Events;
use crate::fixup::Offset;
use crate::read::Arena;
use crate::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    X64,
}

impl Architecture {
    pub fn pointer_size(self) -> usize {
        match self {
            Architecture::X86 => 4,
            Architecture::X64 => 8,
        }
    }

    pub fn from_pointer_size(size: u8) -> Option<Self> {
        match size {
            4 => Some(Architecture::X86),
            8 => Some(Architecture::X64),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => write!(f, "x86"),
            Architecture::X64 => write!(f, "x64"),
        }
    }
}

/// `pointer size | version << 8`, the key layouts are registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutKey(pub u16);

impl LayoutKey {
    pub fn new(arch: Architecture, version: u8) -> Self {
        LayoutKey(arch.pointer_size() as u16 | (u16::from(version) << 8))
    }

    pub fn from_properties(props: Properties) -> Result<Self> {
        if props.version > 0xff {
            return Err(Error::InvalidVersion(props));
        }
        Ok(Self::new(props.architecture, props.version as u8))
    }

    pub fn version(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn architecture(self) -> Option<Architecture> {
        Architecture::from_pointer_size(self.0 as u8)
    }

    pub fn properties(self) -> Option<Properties> {
        self.architecture()
            .map(|arch| Properties::new(u16::from(self.version()), arch))
    }

    pub(crate) fn invalid(self) -> Error {
        Error::InvalidVersion(self.properties().unwrap_or(Properties {
            version: u16::from(self.version()),
            architecture: Architecture::X86,
        }))
    }
}

/// Lays out fields one after another with natural alignment.
#[derive(Debug)]
pub struct LayoutBuilder {
    arch: Architecture,
    offset: usize,
    align: usize,
}

impl LayoutBuilder {
    pub fn new(arch: Architecture) -> Self {
        Self {
            arch,
            offset: 0,
            align: 1,
        }
    }

    pub fn field(&mut self, size: usize, align: usize) -> usize {
        self.offset = align_to(self.offset, align);
        self.align = self.align.max(align);
        let at = self.offset;
        self.offset += size;
        at
    }

    pub fn u8(&mut self) -> usize {
        self.field(1, 1)
    }

    pub fn u16(&mut self) -> usize {
        self.field(2, 2)
    }

    pub fn u32(&mut self) -> usize {
        self.field(4, 4)
    }

    pub fn u64(&mut self) -> usize {
        self.field(8, 8)
    }

    pub fn pointer(&mut self) -> usize {
        let size = self.arch.pointer_size();
        self.field(size, size)
    }

    pub fn vector(&mut self, align: usize) -> usize {
        self.field(16, align)
    }

    pub fn finish(self) -> usize {
        align_to(self.offset, self.align)
    }
}

pub(crate) fn align_to(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

/// Track record generations, in order of appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackRevision {
    V0,
    V1,
    V1_5,
    V2,
    V3,
}

impl TrackRevision {
    pub fn key(self, arch: Architecture) -> LayoutKey {
        let index = match self {
            TrackRevision::V0 => 0,
            TrackRevision::V1 => 1,
            TrackRevision::V1_5 => 2,
            TrackRevision::V2 => 3,
            TrackRevision::V3 => 4,
        };
        LayoutKey::new(arch, index)
    }

    pub fn table(self) -> CompressionTable {
        match self {
            TrackRevision::V0 | TrackRevision::V1 => CompressionTable::Legacy,
            TrackRevision::V1_5 => CompressionTable::Transitional,
            TrackRevision::V2 | TrackRevision::V3 => CompressionTable::Current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoneIdField {
    /// 8 bit id where `0xff` means no bone.
    Byte(usize),
    Int(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackLayout {
    pub revision: TrackRevision,
    pub arch: Architecture,
    pub size: usize,
    pub compression: usize,
    pub track_type: usize,
    pub bone_type: usize,
    pub bone_id: BoneIdField,
    pub mirror_bone: Option<usize>,
    pub weight: usize,
    pub buffer_size: usize,
    pub buffer: usize,
    pub reference: Option<usize>,
    pub extremes: Option<usize>,
    /// The leading four bytes form one word in big-endian files.
    pub packed_header: bool,
}

impl TrackLayout {
    pub fn new(revision: TrackRevision, arch: Architecture) -> Self {
        let mut b = LayoutBuilder::new(arch);
        let compression = b.u8();
        let track_type = b.u8();
        let bone_type = b.u8();
        let (bone_id, mirror_bone) = match revision {
            TrackRevision::V3 => {
                let mirror = b.u8();
                (BoneIdField::Int(b.u32()), Some(mirror))
            }
            _ => (BoneIdField::Byte(b.u8()), None),
        };
        let weight = b.u32();
        let buffer_size = b.u32();
        let buffer = b.pointer();
        let reference = match revision {
            TrackRevision::V0 => None,
            _ => Some(b.vector(4)),
        };
        let extremes = match revision {
            TrackRevision::V2 | TrackRevision::V3 => Some(b.pointer()),
            _ => None,
        };
        Self {
            revision,
            arch,
            size: b.finish(),
            compression,
            track_type,
            bone_type,
            bone_id,
            mirror_bone,
            weight,
            buffer_size,
            buffer,
            reference,
            extremes,
            packed_header: extremes.is_some(),
        }
    }

    pub fn key(&self) -> LayoutKey {
        self.revision.key(self.arch)
    }

    pub fn table(&self) -> CompressionTable {
        self.revision.table()
    }

    pub fn uses_reference_frame(&self) -> bool {
        self.reference.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventGroupLayout {
    pub arch: Architecture,
    pub size: usize,
    pub remaps: usize,
    pub num_events: usize,
    pub events: usize,
}

impl EventGroupLayout {
    pub fn new(arch: Architecture) -> Self {
        let mut b = LayoutBuilder::new(arch);
        let remaps = b.field(2 * 32, 2);
        let num_events = b.u32();
        let events = b.pointer();
        Self {
            arch,
            size: b.finish(),
            remaps,
            num_events,
            events,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLayout {
    /// Fixed number of bitmask groups.
    V1 {
        groups: usize,
        group: EventGroupLayout,
    },
    /// Hash keyed groups, always with 64-bit pointers.
    V2,
}

impl EventLayout {
    pub fn key(&self) -> LayoutKey {
        match self {
            EventLayout::V1 { groups, group } => LayoutKey::new(group.arch, *groups as u8 / 2),
            EventLayout::V2 => LayoutKey::new(Architecture::X64, 3),
        }
    }

    /// Bytes taken when the groups are stored inline in an animation.
    pub fn inline_size(&self) -> usize {
        match self {
            EventLayout::V1 { groups, group } => groups * group.size,
            EventLayout::V2 => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPlacement {
    Inline { offset: usize, layout: EventLayout },
    Pointer { offset: usize, layout: EventLayout },
}

impl EventPlacement {
    pub fn layout(&self) -> &EventLayout {
        match self {
            EventPlacement::Inline { layout, .. } | EventPlacement::Pointer { layout, .. } => layout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatTrackLayout {
    pub arch: Architecture,
    pub size: usize,
    pub remaps: usize,
    pub num_floats: usize,
    pub frames: usize,
}

impl FloatTrackLayout {
    pub fn new(arch: Architecture) -> Self {
        let mut b = LayoutBuilder::new(arch);
        let remaps = b.field(4, 1);
        let num_floats = b.u32();
        let frames = b.pointer();
        Self {
            arch,
            size: b.finish(),
            remaps,
            num_floats,
            frames,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationLayout {
    pub properties: Properties,
    pub size: usize,
    pub tracks: usize,
    pub num_tracks: usize,
    pub num_frames: usize,
    pub loop_frame: Option<usize>,
    pub end_position: usize,
    pub end_rotation: Option<usize>,
    pub flags: Option<usize>,
    pub events: EventPlacement,
    pub float_tracks: Option<(usize, FloatTrackLayout)>,
    pub track: TrackLayout,
}

impl AnimationLayout {
    pub fn arch(&self) -> Architecture {
        self.properties.architecture
    }

    pub fn key(&self) -> LayoutKey {
        LayoutKey::new(self.properties.architecture, self.properties.version as u8)
    }
}

fn track_revision(version: u16) -> Option<TrackRevision> {
    match version {
        22 => Some(TrackRevision::V0),
        40 | 49 | 50 => Some(TrackRevision::V1),
        51 => Some(TrackRevision::V1_5),
        56 | 57 | 66 | 67 => Some(TrackRevision::V2),
        92 => Some(TrackRevision::V3),
        _ => None,
    }
}

fn animation_layout(version: u16, track: TrackLayout, events: EventLayout) -> AnimationLayout {
    let arch = track.arch;
    let mut b = LayoutBuilder::new(arch);
    let tracks = b.pointer();
    let num_tracks = b.u32();
    let num_frames = b.u32();
    let loop_frame = Some(b.u32());
    let end_position = b.vector(16);
    let end_rotation = if version > 22 { Some(b.vector(16)) } else { None };
    let mut flags = None;
    let mut float_tracks = None;
    let events = match version {
        66 | 67 => {
            flags = Some(b.u32());
            let offset = b.pointer();
            float_tracks = Some((b.pointer(), FloatTrackLayout::new(arch)));
            EventPlacement::Pointer {
                offset,
                layout: events,
            }
        }
        92 => {
            flags = Some(b.u32());
            b.pointer();
            b.pointer();
            EventPlacement::Pointer {
                offset: b.pointer(),
                layout: events,
            }
        }
        _ => EventPlacement::Inline {
            offset: b.field(events.inline_size(), arch.pointer_size()),
            layout: events,
        },
    };
    AnimationLayout {
        properties: Properties::new(version, arch),
        size: b.finish(),
        tracks,
        num_tracks,
        num_frames,
        loop_frame,
        end_position,
        end_rotation,
        flags,
        events,
        float_tracks,
        track,
    }
}

pub const SUPPORTED_VERSIONS: [u16; 10] = [22, 40, 49, 50, 51, 56, 57, 66, 67, 92];

/// Every layout known to a load or save call.
///
/// Passed explicitly; there is no global instance.
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    animations: HashMap<LayoutKey, AnimationLayout>,
    tracks: HashMap<LayoutKey, TrackLayout>,
    events: HashMap<LayoutKey, EventLayout>,
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        for &arch in &[Architecture::X86, Architecture::X64] {
            let group = EventGroupLayout::new(arch);
            for &groups in &[2, 4] {
                let layout = EventLayout::V1 { groups, group };
                reg.register_events(layout.key(), layout);
            }
            for &rev in &[
                TrackRevision::V0,
                TrackRevision::V1,
                TrackRevision::V1_5,
                TrackRevision::V2,
                TrackRevision::V3,
            ] {
                let layout = TrackLayout::new(rev, arch);
                reg.register_track(layout.key(), layout);
            }
        }
        reg.register_events(EventLayout::V2.key(), EventLayout::V2);

        for &arch in &[Architecture::X86, Architecture::X64] {
            let group = EventGroupLayout::new(arch);
            for &version in SUPPORTED_VERSIONS.iter() {
                let rev = match track_revision(version) {
                    Some(rev) => rev,
                    None => continue,
                };
                let events = match version {
                    22..=51 => EventLayout::V1 { groups: 2, group },
                    92 => EventLayout::V2,
                    _ => EventLayout::V1 { groups: 4, group },
                };
                let track = TrackLayout::new(rev, arch);
                reg.register_animation(animation_layout(version, track, events));
            }
        }
        reg
    }
}

impl LayoutRegistry {
    pub fn empty() -> Self {
        Self {
            animations: HashMap::new(),
            tracks: HashMap::new(),
            events: HashMap::new(),
        }
    }

    pub fn register_animation(&mut self, layout: AnimationLayout) {
        self.animations.insert(layout.key(), layout);
    }

    pub fn register_track(&mut self, key: LayoutKey, layout: TrackLayout) {
        self.tracks.insert(key, layout);
    }

    pub fn register_events(&mut self, key: LayoutKey, layout: EventLayout) {
        self.events.insert(key, layout);
    }

    pub fn supports(&self, props: Properties) -> bool {
        self.animation(props).is_ok()
    }

    pub fn supported_versions(&self) -> Vec<u16> {
        let mut versions: Vec<u16> = self
            .animations
            .values()
            .map(|l| l.properties.version)
            .collect();
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    pub fn animation(&self, props: Properties) -> Result<&AnimationLayout> {
        let key = LayoutKey::from_properties(props)?;
        self.animations
            .get(&key)
            .ok_or(Error::InvalidVersion(props))
    }

    pub fn track(&self, key: LayoutKey) -> Result<&TrackLayout> {
        self.tracks.get(&key).ok_or_else(|| key.invalid())
    }

    pub fn events(&self, key: LayoutKey) -> Result<&EventLayout> {
        self.events.get(&key).ok_or_else(|| key.invalid())
    }

    pub fn create_animation(&self, props: Properties) -> Result<Animation> {
        self.animation(props).map(|l| Animation::new(*l))
    }

    pub fn load_animation(&self, props: Properties, arena: &Arena, offset: Offset) -> Result<Animation> {
        Animation::load(self.animation(props)?, arena, offset)
    }

    pub fn create_track(&self, key: LayoutKey) -> Result<Track> {
        self.track(key).map(|l| Track::new(*l))
    }

    pub fn load_track(&self, key: LayoutKey, arena: &Arena, offset: Offset) -> Result<Track> {
        Track::load(self.track(key)?, arena, offset)
    }

    pub fn create_events(&self, key: LayoutKey) -> Result<Events> {
        self.events(key).map(Events::new)
    }

    pub fn load_events(&self, key: LayoutKey, arena: &Arena, offset: Offset) -> Result<Events> {
        Events::load(self.events(key)?, arena, offset)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn layout(version: u16, arch: Architecture) -> AnimationLayout {
        *LayoutRegistry::default()
            .animation(Properties::new(version, arch))
            .unwrap()
    }

    #[test]
    fn animation_sizes() {
        use Architecture::*;
        let expect = [
            (22, X86, 176),
            (22, X64, 208),
            (40, X86, 192),
            (51, X64, 224),
            (56, X86, 336),
            (57, X64, 384),
            (66, X86, 64),
            (67, X64, 96),
            (92, X86, 64),
            (92, X64, 96),
        ];
        for &(version, arch, size) in &expect {
            assert_eq!(layout(version, arch).size, size, "v{} {}", version, arch);
        }
    }

    #[test]
    fn animation_offsets() {
        let v66 = layout(66, Architecture::X64);
        assert_eq!(v66.flags, Some(64));
        assert_eq!(
            v66.events,
            EventPlacement::Pointer {
                offset: 72,
                layout: EventLayout::V1 {
                    groups: 4,
                    group: EventGroupLayout::new(Architecture::X64)
                }
            }
        );
        assert_eq!(v66.float_tracks.map(|(o, _)| o), Some(80));

        let v92 = layout(92, Architecture::X64);
        assert!(matches!(v92.events, EventPlacement::Pointer { offset: 88, .. }));

        let v22 = layout(22, Architecture::X86);
        assert_eq!(v22.end_rotation, None);
        assert!(matches!(v22.events, EventPlacement::Inline { offset: 32, .. }));
    }

    #[test]
    fn track_sizes() {
        use Architecture::*;
        use TrackRevision::*;
        let expect = [
            (V0, X86, 16),
            (V0, X64, 24),
            (V1, X86, 32),
            (V1_5, X64, 40),
            (V2, X86, 36),
            (V2, X64, 48),
            (V3, X86, 40),
            (V3, X64, 48),
        ];
        for &(rev, arch, size) in &expect {
            assert_eq!(TrackLayout::new(rev, arch).size, size, "{:?} {}", rev, arch);
        }
        let v3 = TrackLayout::new(V3, X86);
        assert_eq!(v3.bone_id, BoneIdField::Int(4));
        assert_eq!(v3.mirror_bone, Some(3));
        assert_eq!(v3.reference, Some(20));
        assert_eq!(v3.extremes, Some(36));
    }

    #[test]
    fn record_sizes() {
        assert_eq!(EventGroupLayout::new(Architecture::X86).size, 72);
        assert_eq!(EventGroupLayout::new(Architecture::X64).size, 80);
        assert_eq!(FloatTrackLayout::new(Architecture::X86).size, 12);
        assert_eq!(FloatTrackLayout::new(Architecture::X64).size, 16);
    }

    #[test]
    fn keys() {
        assert_eq!(LayoutKey::new(Architecture::X64, 92).0, 0x5c08);
        assert_eq!(TrackRevision::V1_5.key(Architecture::X86).0, 0x204);
        let reg = LayoutRegistry::default();
        assert!(reg.events(LayoutKey(0x108)).is_ok());
        assert!(reg.events(LayoutKey(0x304)).is_err());
        assert_eq!(reg.supported_versions(), SUPPORTED_VERSIONS.to_vec());
    }

    #[test]
    fn unknown_version() {
        let reg = LayoutRegistry::default();
        match reg.create_animation(Properties::new(60, Architecture::X64)) {
            Err(Error::InvalidVersion(p)) => assert_eq!(p.version, 60),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(matches!(
            reg.create_animation(Properties::new(300, Architecture::X86)),
            Err(Error::InvalidVersion(_))
        ));
    }
}
