//! Animation events.
//!
//! Version 1 events are bitmasks of up to 32 triggers per keyframe, grouped
//! in a fixed number of groups that each remap trigger bits to event ids.
//! Version 2 events are hash keyed groups of typed keyframes and always use
//! 64-bit pointers.

use log::trace;
use nom::number::Endianness;
use nom::IResult;

use crate::error::Result;
use crate::fixup::{FixupStorage, Offset};
use crate::layout::{Architecture, EventGroupLayout, EventLayout};
use crate::read::utilities::{f32 as parse_f32, u32 as parse_u32};
use crate::read::{Arena, DeserializeEndian};
use crate::write::{BinWriter, RecordWriter};

#[derive(Debug, Clone, PartialEq)]
pub enum Events {
    V1(EventsV1),
    V2(EventsV2),
}

impl Events {
    pub fn new(layout: &EventLayout) -> Self {
        match layout {
            EventLayout::V1 { groups, group } => Events::V1(EventsV1 {
                layout: *group,
                groups: vec![EventGroup::default(); *groups],
            }),
            EventLayout::V2 => Events::V2(EventsV2::default()),
        }
    }

    pub fn load(layout: &EventLayout, arena: &Arena, offset: Offset) -> Result<Self> {
        match layout {
            EventLayout::V1 { groups, group } => {
                let groups = (0..*groups)
                    .map(|i| EventGroup::load(group, arena, offset + i * group.size))
                    .collect::<Result<_>>()?;
                Ok(Events::V1(EventsV1 {
                    layout: *group,
                    groups,
                }))
            }
            EventLayout::V2 => EventsV2::load(arena, offset).map(Events::V2),
        }
    }

    pub fn layout(&self) -> EventLayout {
        match self {
            Events::V1(e) => EventLayout::V1 {
                groups: e.groups.len(),
                group: e.layout,
            },
            Events::V2(_) => EventLayout::V2,
        }
    }

    pub fn num_groups(&self) -> usize {
        match self {
            Events::V1(e) => e.num_groups(),
            Events::V2(e) => e.groups.len(),
        }
    }

    pub fn group_event_count(&self, group: usize) -> Option<usize> {
        match self {
            Events::V1(e) => e.group_event_count(group),
            Events::V2(e) => e.groups.get(group).map(|g| g.events.len()),
        }
    }

    /// Writes the event table at the current position, resolving its own
    /// pointers.
    pub(crate) fn write_table(&self, w: &mut BinWriter) -> Result<()> {
        match self {
            Events::V1(e) => {
                let mut fixups = FixupStorage::new();
                e.write_groups(w, &mut fixups)?;
                e.write_group_data(w, &mut fixups)?;
                fixups.fixup_pointers(w, e.layout.arch)
            }
            Events::V2(e) => e.write(w),
        }
    }
}

/// One bitmask keyframe, lasting `num_frames`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnimEvent {
    pub trigger_bits: u32,
    pub num_frames: u32,
}

impl DeserializeEndian for AnimEvent {
    fn parse(i: &[u8], endian: Endianness) -> IResult<&[u8], Self> {
        let (i, trigger_bits) = parse_u32(endian)(i)?;
        let (i, num_frames) = parse_u32(endian)(i)?;
        Ok((i, Self { trigger_bits, num_frames }))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventGroup {
    /// Event id of each trigger bit.
    pub remaps: [u16; 32],
    pub events: Vec<AnimEvent>,
}

impl EventGroup {
    fn load(layout: &EventGroupLayout, arena: &Arena, offset: Offset) -> Result<Self> {
        let rec = arena.record(offset, layout.size)?;
        let mut remaps = [0; 32];
        for (i, r) in remaps.iter_mut().enumerate() {
            *r = rec.u16(layout.remaps + i * 2)?;
        }
        let num_events = rec.u32(layout.num_events)? as usize;
        let events = match rec.offset(layout.events, layout.arch)? {
            Some(at) => arena.parse_many(at, num_events)?,
            None => Vec::new(),
        };
        Ok(Self { remaps, events })
    }

    /// Event ids raised by keyframe `event`, in trigger bit order.
    pub fn get_events(&self, event: usize) -> Option<Vec<u16>> {
        let bits = self.events.get(event)?.trigger_bits;
        Some(
            (0..32)
                .filter(|b| bits & (1 << b) != 0)
                .map(|b| self.remaps[b])
                .collect(),
        )
    }

    /// First frame of keyframe `event`, summed as u64.
    pub fn event_frame(&self, event: usize) -> Option<u64> {
        if event >= self.events.len() {
            return None;
        }
        Some(self.events[..event].iter().map(|e| u64::from(e.num_frames)).sum())
    }

    /// Start frame and raised ids of every keyframe that triggers anything.
    pub fn timeline(&self) -> Vec<(u64, Vec<u16>)> {
        let mut frame = 0u64;
        let mut out = Vec::new();
        for (i, e) in self.events.iter().enumerate() {
            if e.trigger_bits != 0 {
                out.push((frame, self.get_events(i).unwrap_or_default()));
            }
            frame += u64::from(e.num_frames);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventsV1 {
    layout: EventGroupLayout,
    groups: Vec<EventGroup>,
}

impl EventsV1 {
    pub fn groups(&self) -> &[EventGroup] {
        &self.groups
    }

    pub fn group_layout(&self) -> &EventGroupLayout {
        &self.layout
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn group(&self, group: usize) -> Option<&EventGroup> {
        self.groups.get(group)
    }

    pub fn group_mut(&mut self, group: usize) -> Option<&mut EventGroup> {
        self.groups.get_mut(group)
    }

    pub fn group_event_count(&self, group: usize) -> Option<usize> {
        self.group(group).map(|g| g.events.len())
    }

    pub fn get_events(&self, group: usize, event: usize) -> Option<Vec<u16>> {
        self.group(group)?.get_events(event)
    }

    pub fn event_frame(&self, group: usize, event: usize) -> Option<u64> {
        self.group(group)?.event_frame(event)
    }

    /// Group records, with their event pointers queued in `fixups`.
    pub(crate) fn write_groups(&self, w: &mut BinWriter, fixups: &mut FixupStorage) -> Result<()> {
        let l = &self.layout;
        for g in &self.groups {
            let mut rec = RecordWriter::new(l.size, w.endian());
            for (i, r) in g.remaps.iter().enumerate() {
                rec.put_u16(l.remaps + i * 2, *r)?;
            }
            rec.put_u32(l.num_events, g.events.len() as u32)?;
            rec.put_pointer(l.events);
            w.write_record(&rec, fixups)?;
        }
        Ok(())
    }

    pub(crate) fn write_group_data(&self, w: &mut BinWriter, fixups: &mut FixupStorage) -> Result<()> {
        for g in &self.groups {
            if g.events.is_empty() {
                fixups.skip_to()?;
                continue;
            }
            w.pad(16)?;
            fixups.save_to(w)?;
            for e in &g.events {
                w.write_u32(e.trigger_bits)?;
                w.write_u32(e.num_frames)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFrameType {
    Scalar,
    Scalar2,
    Scalar3,
    PackedFloat,
    PackedBitFlags,
    PackedInt,
    Unknown(u16),
}

impl From<u16> for EventFrameType {
    fn from(v: u16) -> Self {
        match v {
            0 => EventFrameType::Scalar,
            1 => EventFrameType::Scalar2,
            2 => EventFrameType::Scalar3,
            3 => EventFrameType::PackedFloat,
            5 => EventFrameType::PackedBitFlags,
            6 => EventFrameType::PackedInt,
            v => EventFrameType::Unknown(v),
        }
    }
}

impl From<EventFrameType> for u16 {
    fn from(t: EventFrameType) -> Self {
        match t {
            EventFrameType::Scalar => 0,
            EventFrameType::Scalar2 => 1,
            EventFrameType::Scalar3 => 2,
            EventFrameType::PackedFloat => 3,
            EventFrameType::PackedBitFlags => 5,
            EventFrameType::PackedInt => 6,
            EventFrameType::Unknown(v) => v,
        }
    }
}

impl Default for EventFrameType {
    fn default() -> Self {
        EventFrameType::Scalar
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDataType {
    Int8,
    Int32,
    Float,
    Bool,
    Unknown(u16),
}

impl From<u16> for EventDataType {
    fn from(v: u16) -> Self {
        match v {
            0 => EventDataType::Int8,
            1 => EventDataType::Int32,
            2 => EventDataType::Float,
            4 => EventDataType::Bool,
            v => EventDataType::Unknown(v),
        }
    }
}

impl From<EventDataType> for u16 {
    fn from(t: EventDataType) -> Self {
        match t {
            EventDataType::Int8 => 0,
            EventDataType::Int32 => 1,
            EventDataType::Float => 2,
            EventDataType::Bool => 4,
            EventDataType::Unknown(v) => v,
        }
    }
}

impl Default for EventDataType {
    fn default() -> Self {
        EventDataType::Int8
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventValue {
    Int8(i8),
    Int32(i32),
    Float(f32),
    Bool(bool),
}

/// Typed keyframe of a version 2 event.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventFrame {
    /// Three words read as floats or integers depending on `data_type`.
    pub payload: [u32; 3],
    pub frame: f32,
    pub frame_type: EventFrameType,
    pub data_type: EventDataType,
}

impl EventFrame {
    const SIZE: usize = 20;

    pub fn components(&self) -> usize {
        match self.frame_type {
            EventFrameType::Scalar2 => 2,
            EventFrameType::Scalar3 => 3,
            _ => 1,
        }
    }

    pub fn value(&self, component: usize) -> Option<EventValue> {
        let raw = *self.payload.get(component)?;
        match self.data_type {
            EventDataType::Int8 => Some(EventValue::Int8(raw as i8)),
            EventDataType::Int32 => Some(EventValue::Int32(raw as i32)),
            EventDataType::Float => Some(EventValue::Float(f32::from_bits(raw))),
            EventDataType::Bool => Some(EventValue::Bool(raw != 0)),
            EventDataType::Unknown(_) => None,
        }
    }

    pub fn values(&self) -> Vec<EventValue> {
        (0..self.components()).filter_map(|c| self.value(c)).collect()
    }

    pub fn set_value(&mut self, component: usize, value: EventValue) {
        let (raw, data_type) = match value {
            EventValue::Int8(v) => (v as i32 as u32, EventDataType::Int8),
            EventValue::Int32(v) => (v as u32, EventDataType::Int32),
            EventValue::Float(v) => (v.to_bits(), EventDataType::Float),
            EventValue::Bool(v) => (v as u32, EventDataType::Bool),
        };
        if let Some(slot) = self.payload.get_mut(component) {
            *slot = raw;
            self.data_type = data_type;
        }
    }
}

impl DeserializeEndian for EventFrame {
    fn parse(i: &[u8], endian: Endianness) -> IResult<&[u8], Self> {
        use crate::read::utilities::u16 as parse_u16;
        let (i, a) = parse_u32(endian)(i)?;
        let (i, b) = parse_u32(endian)(i)?;
        let (i, c) = parse_u32(endian)(i)?;
        let (i, frame) = parse_f32(endian)(i)?;
        let (i, frame_type) = parse_u16(endian)(i)?;
        let (i, data_type) = parse_u16(endian)(i)?;
        Ok((
            i,
            Self {
                payload: [a, b, c],
                frame,
                frame_type: frame_type.into(),
                data_type: data_type.into(),
            },
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventV2 {
    pub hash: u32,
    pub data_type: EventDataType,
    pub frames: Vec<EventFrame>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventGroupV2 {
    pub hash: u32,
    pub events: Vec<EventV2>,
}

/// Hash keyed event collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventsV2 {
    pub hash: u32,
    pub num_frames: f32,
    pub loop_frame: f32,
    pub groups: Vec<EventGroupV2>,
}

const HEADER_V2_SIZE: usize = 40;
const GROUP_V2_SIZE: usize = 24;
const EVENT_V2_SIZE: usize = 24;

impl EventsV2 {
    fn load(arena: &Arena, offset: Offset) -> Result<Self> {
        let arch = Architecture::X64;
        let rec = arena.record(offset, HEADER_V2_SIZE)?;
        let num_groups = rec.u64(8)? as usize;
        let mut groups = Vec::new();
        if let Some(at) = rec.offset(0, arch)? {
            for g in 0..num_groups {
                let grec = arena.record(at + g * GROUP_V2_SIZE, GROUP_V2_SIZE)?;
                let num_events = grec.u64(8)? as usize;
                let mut events = Vec::new();
                if let Some(at) = grec.offset(0, arch)? {
                    for e in 0..num_events {
                        let erec = arena.record(at + e * EVENT_V2_SIZE, EVENT_V2_SIZE)?;
                        let num_frames = erec.u64(8)? as usize;
                        let frames = match erec.offset(0, arch)? {
                            Some(at) => arena.parse_many(at, num_frames)?,
                            None => Vec::new(),
                        };
                        events.push(EventV2 {
                            hash: erec.u32(16)?,
                            data_type: erec.u16(20)?.into(),
                            frames,
                        });
                    }
                }
                groups.push(EventGroupV2 {
                    hash: grec.u32(16)?,
                    events,
                });
            }
        }
        trace!("v2 events @{:#x}: {} groups", offset, groups.len());
        Ok(Self {
            hash: rec.u32(36)?,
            num_frames: rec.f32(24)?,
            loop_frame: rec.f32(28)?,
            groups,
        })
    }

    pub fn total_events(&self) -> usize {
        self.groups.iter().map(|g| g.events.len()).sum()
    }

    pub fn total_frames(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.events.iter())
            .map(|e| e.frames.len())
            .sum()
    }

    pub fn group_hash(&self, group: usize) -> Option<u32> {
        self.groups.get(group).map(|g| g.hash)
    }

    pub fn event_hash(&self, group: usize, event: usize) -> Option<u32> {
        self.groups.get(group)?.events.get(event).map(|e| e.hash)
    }

    fn write(&self, w: &mut BinWriter) -> Result<()> {
        let mut fixups = FixupStorage::new();
        let mut rec = RecordWriter::new(HEADER_V2_SIZE, w.endian());
        rec.put_pointer(0);
        rec.put_u64(8, self.groups.len() as u64)?;
        rec.put_i32(16, self.total_events() as i32)?;
        rec.put_i32(20, self.total_frames() as i32)?;
        rec.put_f32(24, self.num_frames)?;
        rec.put_f32(28, self.loop_frame)?;
        rec.put_u32(36, self.hash)?;
        w.write_record(&rec, &mut fixups)?;

        pad_to_next(w, &mut fixups, self.groups.is_empty())?;
        for g in &self.groups {
            let mut rec = RecordWriter::new(GROUP_V2_SIZE, w.endian());
            rec.put_pointer(0);
            rec.put_u64(8, g.events.len() as u64)?;
            rec.put_u32(16, g.hash)?;
            w.write_record(&rec, &mut fixups)?;
        }
        for g in &self.groups {
            pad_to_next(w, &mut fixups, g.events.is_empty())?;
            for e in &g.events {
                let mut rec = RecordWriter::new(EVENT_V2_SIZE, w.endian());
                rec.put_pointer(0);
                rec.put_u64(8, e.frames.len() as u64)?;
                rec.put_u32(16, e.hash)?;
                rec.put_u16(20, e.data_type.into())?;
                w.write_record(&rec, &mut fixups)?;
            }
        }
        for e in self.groups.iter().flat_map(|g| g.events.iter()) {
            pad_to_next(w, &mut fixups, e.frames.is_empty())?;
            for f in &e.frames {
                let mut rec = RecordWriter::new(EventFrame::SIZE, w.endian());
                for (i, p) in f.payload.iter().enumerate() {
                    rec.put_u32(i * 4, *p)?;
                }
                rec.put_f32(12, f.frame)?;
                rec.put_u16(16, f.frame_type.into())?;
                rec.put_u16(18, f.data_type.into())?;
                w.write_record(&rec, &mut fixups)?;
            }
        }
        fixups.fixup_pointers(w, Architecture::X64)
    }
}

fn pad_to_next(w: &mut BinWriter, fixups: &mut FixupStorage, empty: bool) -> Result<()> {
    if empty {
        return fixups.skip_to();
    }
    w.pad(16)?;
    fixups.save_to(w)
}

#[cfg(test)]
mod test {
    use super::*;

    fn v1_layout(groups: usize, arch: Architecture) -> EventLayout {
        EventLayout::V1 {
            groups,
            group: EventGroupLayout::new(arch),
        }
    }

    #[test]
    fn trigger_expansion() {
        let mut group = EventGroup::default();
        group.remaps[0] = 11;
        group.remaps[5] = 22;
        group.remaps[9] = 33;
        group.events.push(AnimEvent {
            trigger_bits: 1 | 1 << 5 | 1 << 9,
            num_frames: 4,
        });
        assert_eq!(group.get_events(0), Some(vec![11, 22, 33]));
        assert_eq!(group.get_events(1), None);
    }

    #[test]
    fn frames_accumulate() {
        let mut group = EventGroup::default();
        group.remaps[1] = 7;
        for &(bits, n) in &[(0, 10), (2, 5), (0, 3), (2, 1)] {
            group.events.push(AnimEvent {
                trigger_bits: bits,
                num_frames: n,
            });
        }
        assert_eq!(group.event_frame(3), Some(18));
        assert_eq!(group.timeline(), vec![(10, vec![7]), (18, vec![7])]);
    }

    #[test]
    fn huge_frame_counts() {
        let mut group = EventGroup::default();
        group.remaps[0] = 3;
        for &(bits, n) in &[(0, u32::MAX), (1, 2), (1, 2)] {
            group.events.push(AnimEvent {
                trigger_bits: bits,
                num_frames: n,
            });
        }
        let max = u64::from(u32::MAX);
        assert_eq!(group.event_frame(2), Some(max + 2));
        assert_eq!(group.timeline(), vec![(max, vec![3]), (max + 2, vec![3])]);
    }

    #[test]
    fn v1_table_round_trip() {
        let layout = v1_layout(4, Architecture::X86);
        let mut events = Events::new(&layout);
        if let Events::V1(e) = &mut events {
            let g = e.group_mut(2).unwrap();
            g.remaps[3] = 0x1234;
            g.events.push(AnimEvent {
                trigger_bits: 8,
                num_frames: 30,
            });
        }
        let mut w = BinWriter::new(Endianness::Big);
        events.write_table(&mut w).unwrap();
        let arena = Arena::new(w.into_inner(), Endianness::Big);
        let loaded = Events::load(&layout, &arena, 0).unwrap();
        assert_eq!(loaded, events);
        assert_eq!(loaded.group_event_count(2), Some(1));
        assert_eq!(loaded.group_event_count(0), Some(0));
    }

    #[test]
    fn v2_round_trip() {
        let mut frame = EventFrame {
            frame: 12.5,
            frame_type: EventFrameType::Scalar2,
            ..Default::default()
        };
        frame.set_value(0, EventValue::Float(0.25));
        frame.set_value(1, EventValue::Float(-1.0));
        let events = EventsV2 {
            hash: 0xdead_beef,
            num_frames: 60.0,
            loop_frame: 0.0,
            groups: vec![
                EventGroupV2::default(),
                EventGroupV2 {
                    hash: 7,
                    events: vec![
                        EventV2 {
                            hash: 1,
                            data_type: EventDataType::Float,
                            frames: vec![frame, frame],
                        },
                        EventV2 {
                            frames: vec![frame],
                            ..Default::default()
                        },
                    ],
                },
            ],
        };
        let events = Events::V2(events);
        let mut w = BinWriter::new(Endianness::Little);
        events.write_table(&mut w).unwrap();
        let bytes = w.into_inner();
        assert_eq!(&bytes[16..20], &2i32.to_le_bytes()[..]);
        assert_eq!(&bytes[20..24], &3i32.to_le_bytes()[..]);

        let arena = Arena::new(bytes, Endianness::Little);
        let loaded = Events::load(&EventLayout::V2, &arena, 0).unwrap();
        assert_eq!(loaded, events);
        if let Events::V2(e) = &loaded {
            let f = &e.groups[1].events[0].frames[1];
            assert_eq!(f.values(), vec![EventValue::Float(0.25), EventValue::Float(-1.0)]);
            assert_eq!(e.event_hash(1, 0), Some(1));
            assert_eq!(e.group_hash(0), Some(0));
        }
    }

    #[test]
    fn payload_views() {
        let mut frame = EventFrame::default();
        frame.set_value(0, EventValue::Int8(-3));
        assert_eq!(frame.value(0), Some(EventValue::Int8(-3)));
        frame.set_value(2, EventValue::Bool(true));
        assert_eq!(frame.value(2), Some(EventValue::Bool(true)));
        assert_eq!(frame.value(3), None);
    }
}
