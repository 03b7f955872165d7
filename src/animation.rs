use log::trace;

use crate::error::{Properties, Result};
use crate::event::Events;
use crate::fixup::{FixupStorage, Offset};
use crate::float_track::FloatTracks;
use crate::layout::{AnimationLayout, EventPlacement};
use crate::read::Arena;
use crate::track::Track;
use crate::write::{BinWriter, RecordWriter};
use crate::Vector;

/// Header flag set when the event table carries data.
pub const EVENTS: u32 = 0x80_0000;
/// Header flag set when float tracks carry data.
pub const FLOAT_TRACKS: u32 = 0x4_0000;

#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    layout: AnimationLayout,
    tracks: Vec<Track>,
    events: Option<Events>,
    float_tracks: Option<FloatTracks>,
    pub num_frames: u32,
    pub loop_frame: i32,
    /// Position delta applied at the end of a loop.
    pub end_position: Vector,
    /// Rotation delta applied at the end of a loop.
    pub end_rotation: Vector,
    flags: u32,
}

impl Animation {
    pub fn new(layout: AnimationLayout) -> Self {
        let events = match &layout.events {
            EventPlacement::Inline { layout, .. } => Some(Events::new(layout)),
            EventPlacement::Pointer { .. } => None,
        };
        Self {
            layout,
            tracks: Vec::new(),
            events,
            float_tracks: None,
            num_frames: 0,
            loop_frame: 0,
            end_position: Vector::new(0.0, 0.0, 0.0, 0.0),
            end_rotation: Vector::new(0.0, 0.0, 0.0, 1.0),
            flags: 0,
        }
    }

    pub fn load(layout: &AnimationLayout, arena: &Arena, offset: Offset) -> Result<Self> {
        let arch = layout.arch();
        let rec = arena.record(offset, layout.size)?;

        let num_tracks = rec.u32(layout.num_tracks)? as usize;
        let tracks = match rec.offset(layout.tracks, arch)? {
            Some(at) => (0..num_tracks)
                .map(|i| Track::load(&layout.track, arena, at + i * layout.track.size))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let events = match &layout.events {
            EventPlacement::Inline { offset: field, layout } => {
                Some(Events::load(layout, arena, offset + field)?)
            }
            EventPlacement::Pointer { offset: field, layout } => match rec.offset(*field, arch)? {
                Some(at) => Some(Events::load(layout, arena, at)?),
                None => None,
            },
        };
        let float_tracks = match &layout.float_tracks {
            Some((field, layout)) => match rec.offset(*field, arch)? {
                Some(at) => Some(FloatTracks::load(layout, arena, at)?),
                None => None,
            },
            None => None,
        };

        let anim = Self {
            layout: *layout,
            tracks,
            events,
            float_tracks,
            num_frames: rec.u32(layout.num_frames)?,
            loop_frame: match layout.loop_frame {
                Some(field) => rec.i32(field)?,
                None => 0,
            },
            end_position: rec.vector(layout.end_position)?,
            end_rotation: match layout.end_rotation {
                Some(field) => rec.vector(field)?,
                None => Vector::new(0.0, 0.0, 0.0, 1.0),
            },
            flags: match layout.flags {
                Some(field) => rec.u32(field)?,
                None => 0,
            },
        };
        trace!(
            "animation @{:#x}: {} tracks, {} frames",
            offset,
            anim.tracks.len(),
            anim.num_frames
        );
        Ok(anim)
    }

    pub fn layout(&self) -> &AnimationLayout {
        &self.layout
    }

    pub fn properties(&self) -> Properties {
        self.layout.properties
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    /// Empty track in this animation's track layout.
    pub fn create_track(&self) -> Track {
        Track::new(self.layout.track)
    }

    /// Adds `track`, moving it to this animation's track layout.
    pub fn add_track(&mut self, mut track: Track) -> &mut Track {
        track.set_layout(self.layout.track);
        self.tracks.push(track);
        let last = self.tracks.len() - 1;
        &mut self.tracks[last]
    }

    pub fn remove_track(&mut self, index: usize) -> Option<Track> {
        if index < self.tracks.len() {
            Some(self.tracks.remove(index))
        } else {
            None
        }
    }

    pub fn events(&self) -> Option<&Events> {
        self.events.as_ref()
    }

    pub fn events_mut(&mut self) -> Option<&mut Events> {
        self.events.as_mut()
    }

    /// Event storage of this layout, created empty if absent.
    pub fn create_events(&mut self) -> &mut Events {
        let layout = *self.layout.events.layout();
        self.events.get_or_insert_with(|| Events::new(&layout))
    }

    /// Drops the events. Inline groups are reset instead.
    pub fn clear_events(&mut self) {
        self.events = match &self.layout.events {
            EventPlacement::Inline { layout, .. } => Some(Events::new(layout)),
            EventPlacement::Pointer { .. } => None,
        };
    }

    pub fn float_tracks(&self) -> Option<&FloatTracks> {
        self.float_tracks.as_ref()
    }

    pub fn float_tracks_mut(&mut self) -> Option<&mut FloatTracks> {
        self.float_tracks.as_mut()
    }

    /// Float tracks, created empty if absent. `None` when the layout has no
    /// room for them.
    pub fn create_float_tracks(&mut self) -> Option<&mut FloatTracks> {
        let (_, layout) = self.layout.float_tracks?;
        Some(self.float_tracks.get_or_insert_with(|| FloatTracks::new(layout)))
    }

    pub fn clear_float_tracks(&mut self) {
        self.float_tracks = None;
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    pub fn loop_frame(&self) -> i32 {
        self.loop_frame
    }

    pub fn duration(&self, frame_rate: f32) -> f32 {
        self.num_frames as f32 / frame_rate
    }

    /// Version specific header flags, as stored.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    /// Sets every track's sampling rate.
    pub fn set_frame_rate(&mut self, frame_rate: f32) {
        for t in &mut self.tracks {
            t.frame_rate = frame_rate;
        }
    }

    /// Recomputes the frame count from the track keys.
    pub fn sanitize(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        let last = self
            .tracks
            .iter()
            .filter_map(Track::last_frame)
            .max()
            .unwrap_or(0)
            .max(0);
        let use_ref = self.layout.track.uses_reference_frame() as i32;
        self.num_frames = (last + use_ref) as u32;
    }

    /// Writes the animation at the current position, which must be 16 byte
    /// aligned, and resolves all of its pointers.
    pub(crate) fn write(&self, w: &mut BinWriter) -> Result<()> {
        let l = &self.layout;
        let start = w.tell();
        let mut fixups = FixupStorage::new();

        let mut rec = RecordWriter::new(l.size, w.endian());
        rec.put_pointer(l.tracks);
        rec.put_u32(l.num_tracks, self.tracks.len() as u32)?;
        rec.put_u32(l.num_frames, self.num_frames)?;
        if let Some(at) = l.loop_frame {
            rec.put_i32(at, self.loop_frame)?;
        }
        rec.put_vector(l.end_position, self.end_position)?;
        if let Some(at) = l.end_rotation {
            rec.put_vector(at, self.end_rotation)?;
        }
        if let Some(at) = l.flags {
            rec.put_u32(at, self.flags)?;
        }
        if let EventPlacement::Pointer { offset, .. } = l.events {
            rec.put_pointer(offset);
        }
        if let Some((at, _)) = l.float_tracks {
            rec.put_pointer(at);
        }
        w.write_record(&rec, &mut fixups)?;

        let inline = match (&l.events, &self.events) {
            (EventPlacement::Inline { offset, .. }, Some(Events::V1(events))) => {
                w.seek(start + *offset as u64);
                events.write_groups(w, &mut fixups)?;
                w.seek(start + l.size as u64);
                Some(events)
            }
            _ => None,
        };

        if self.tracks.is_empty() {
            fixups.skip_to()?;
        } else {
            w.pad(16)?;
            fixups.save_to(w)?;
            for t in &self.tracks {
                t.write_record(w, &mut fixups)?;
            }
        }

        match inline {
            Some(events) => events.write_group_data(w, &mut fixups)?,
            None => {
                if let EventPlacement::Pointer { .. } = l.events {
                    write_table(w, &mut fixups, self.events.as_ref(), Events::write_table)?;
                }
            }
        }
        if l.float_tracks.is_some() {
            write_table(w, &mut fixups, self.float_tracks.as_ref(), FloatTracks::write)?;
        }

        for t in &self.tracks {
            t.write_buffers(w, &mut fixups)?;
        }
        fixups.fixup_pointers(w, l.arch())
    }
}

fn write_table<T>(
    w: &mut BinWriter,
    fixups: &mut FixupStorage,
    table: Option<&T>,
    write: fn(&T, &mut BinWriter) -> Result<()>,
) -> Result<()> {
    match table {
        Some(t) => {
            w.pad(16)?;
            fixups.save_to(w)?;
            write(t, w)
        }
        None => fixups.skip_to(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::test::assert_close;
    use crate::codec::CodecKind;
    use crate::event::AnimEvent;
    use crate::float_track::FloatFrame;
    use crate::layout::{Architecture, LayoutRegistry};
    use nom::number::Endianness;

    fn authored(version: u16, arch: Architecture) -> Animation {
        let reg = LayoutRegistry::default();
        let mut anim = reg
            .create_animation(Properties::new(version, arch))
            .unwrap();
        let mut track = anim.create_track();
        track.bone_index = 3;
        track
            .encode(
                CodecKind::LinearVector3,
                &[
                    (0, Vector::new(0.0, 1.0, 2.0, 1.0)),
                    (8, Vector::new(4.0, 1.0, 2.0, 1.0)),
                ],
                None,
            )
            .unwrap();
        anim.add_track(track);
        anim.add_track(anim.create_track());
        anim.loop_frame = 2;
        anim.end_position = Vector::new(1.0, 0.0, 0.0, 0.0);
        anim.sanitize();
        anim
    }

    fn reload(anim: &Animation, endian: Endianness) -> Animation {
        let mut w = BinWriter::new(endian);
        anim.write(&mut w).unwrap();
        let arena = Arena::new(w.into_inner(), endian);
        Animation::load(anim.layout(), &arena, 0).unwrap()
    }

    #[test]
    fn sanitize_counts_reference_frame() {
        assert_eq!(authored(22, Architecture::X86).num_frames, 8);
        assert_eq!(authored(40, Architecture::X86).num_frames, 9);
        let mut anim = authored(40, Architecture::X86);
        anim.tracks.clear();
        anim.num_frames = 5;
        anim.sanitize();
        assert_eq!(anim.num_frames, 5);
    }

    #[test]
    fn inline_events_round_trip() {
        let mut anim = authored(56, Architecture::X64);
        if let Some(Events::V1(ev)) = anim.events_mut() {
            let g = ev.group_mut(3).unwrap();
            g.remaps[0] = 5;
            g.events.push(AnimEvent {
                trigger_bits: 1,
                num_frames: 9,
            });
        }
        let loaded = reload(&anim, Endianness::Little);
        assert_eq!(loaded, anim);
        assert_close(
            loaded.tracks()[0].get_value(5.0 / 60.0).unwrap(),
            Vector::new(2.0, 1.0, 2.0, 1.0),
            1e-4,
        );
    }

    #[test]
    fn pointer_tables_round_trip() {
        for &arch in &[Architecture::X86, Architecture::X64] {
            let mut anim = authored(67, arch);
            anim.set_flags(EVENTS | FLOAT_TRACKS);
            anim.create_events();
            let floats = anim.create_float_tracks().unwrap();
            floats.groups[2].frames.push(FloatFrame::new(3, &[0.5, 0.25]));
            let loaded = reload(&anim, Endianness::Big);
            assert_eq!(loaded, anim);
            assert_eq!(loaded.flags() & FLOAT_TRACKS, FLOAT_TRACKS);
        }
    }

    #[test]
    fn absent_tables_stay_null() {
        let mut anim = authored(92, Architecture::X64);
        anim.clear_events();
        assert!(anim.create_float_tracks().is_none());
        let loaded = reload(&anim, Endianness::Little);
        assert!(loaded.events().is_none());
        assert_eq!(loaded.tracks().len(), 2);
    }

    #[test]
    fn v92_events() {
        let mut anim = authored(92, Architecture::X86);
        if let Events::V2(ev) = anim.create_events() {
            ev.hash = 0x1234;
            ev.num_frames = 8.0;
        }
        let loaded = reload(&anim, Endianness::Little);
        assert_eq!(loaded, anim);
    }

    #[test]
    fn duration() {
        let anim = authored(22, Architecture::X64);
        assert!((anim.duration(60.0) - 8.0 / 60.0).abs() < 1e-6);
    }
}
