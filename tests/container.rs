use anyhow::Result;
use lmt::codec::CompressionTable;
use lmt::event::{AnimEvent, EventFrame, EventGroupV2, EventV2};
use lmt::float_track::FloatFrame;
use lmt::{
    Animation, Architecture, CodecKind, Container, Error, EventValue, Events, ExportSettings,
    LayoutRegistry, Properties, Settings, Track, Vector,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const CODECS: [CodecKind; 14] = [
    CodecKind::SingleVector3,
    CodecKind::StepRotationQuat3,
    CodecKind::LinearVector3,
    CodecKind::HermiteVector3,
    CodecKind::SphericalRotation,
    CodecKind::BiLinearVector3_16bit,
    CodecKind::BiLinearVector3_8bit,
    CodecKind::LinearRotationQuat4_14bit,
    CodecKind::BiLinearRotationQuat4_7bit,
    CodecKind::BiLinearRotationQuat4_9bit,
    CodecKind::BiLinearRotationQuat4_11bit,
    CodecKind::BiLinearRotationQuatXW_14bit,
    CodecKind::BiLinearRotationQuatYW_14bit,
    CodecKind::BiLinearRotationQuatZW_14bit,
];

fn quat(x: f32, y: f32, z: f32) -> Vector {
    Vector::new(x, y, z, (1.0 - x * x - y * y - z * z).sqrt())
}

fn values(kind: CodecKind) -> Vec<Vector> {
    use CodecKind::*;
    match kind {
        SingleVector3 | LinearVector3 | HermiteVector3 => vec![
            Vector::new(1.5, -20.25, 300.0, 1.0),
            Vector::new(-0.001, 0.0, 42.0, 1.0),
            Vector::new(7.0, 8.0, 9.0, 1.0),
        ],
        StepRotationQuat3 | SphericalRotation => {
            vec![quat(0.1, 0.2, 0.3), quat(-0.5, 0.25, -0.125), quat(0.0, -0.7, 0.1)]
        }
        LinearRotationQuat4_14bit => vec![quat(0.1, -0.2, 0.3), quat(0.4, 0.1, -0.3)],
        BiLinearVector3_16bit | BiLinearVector3_8bit => vec![
            Vector::new(0.0, 0.5, 1.0, 1.0),
            Vector::new(0.3, 0.9, 0.01, 1.0),
            Vector::new(0.6, 0.2, 0.4, 1.0),
        ],
        BiLinearRotationQuatXW_14bit => vec![
            Vector::new(0.4, 0.0, 0.0, 0.8),
            Vector::new(0.1, 0.0, 0.0, 0.3),
        ],
        BiLinearRotationQuatYW_14bit => vec![
            Vector::new(0.0, 0.6, 0.0, 0.1),
            Vector::new(0.0, 0.2, 0.0, 0.9),
        ],
        BiLinearRotationQuatZW_14bit => vec![
            Vector::new(0.0, 0.0, 0.95, 0.5),
            Vector::new(0.0, 0.0, 0.25, 0.75),
        ],
        _ => vec![
            Vector::new(0.0, 0.25, 0.5, 1.0),
            Vector::new(0.9, 0.1, 0.33, 0.66),
            Vector::new(0.5, 0.5, 0.5, 0.5),
        ],
    }
}

fn keys(kind: CodecKind) -> Vec<(i32, Vector)> {
    values(kind)
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i as i32, v))
        .collect()
}

/// A version whose compression table can store `kind`.
fn version_for(kind: CodecKind) -> u16 {
    if CompressionTable::Current.code(kind).is_some() {
        67
    } else {
        40
    }
}

fn close(a: Vector, b: Vector, eps: f32) -> bool {
    let d = a - b;
    d.x.abs() <= eps && d.y.abs() <= eps && d.z.abs() <= eps && d.w.abs() <= eps
}

fn authored(container: &Container, kinds: &[CodecKind]) -> Result<Animation> {
    let mut anim = container.create_animation();
    for (bone, &kind) in kinds.iter().enumerate() {
        let mut track = anim.create_track();
        track.bone_index = bone as i32;
        track.encode(kind, &keys(kind), None)?;
        anim.add_track(track);
    }
    anim.sanitize();
    Ok(anim)
}

#[test]
fn every_codec_survives_a_round_trip() -> Result<()> {
    init();
    let reg = LayoutRegistry::default();
    for &kind in CODECS.iter() {
        for &arch in &[Architecture::X86, Architecture::X64] {
            let props = Properties::new(version_for(kind), arch);
            let mut c = Container::new(&reg, props)?;
            let anim = authored(&c, &[kind])?;
            c.append_animation(anim)?;

            let loaded = Container::load(&reg, c.save()?)?;
            assert_eq!(loaded.properties(), props);
            let track: &Track = &loaded.animation(0).unwrap().tracks()[0];
            assert_eq!(track.codec_kind(), kind);
            let shift = track.use_ref_frame() as usize;
            for (i, (frame, value)) in keys(kind).into_iter().enumerate() {
                assert_eq!(track.frame(i + shift), Some(frame + shift as i32));
                let got = track.evaluate(i + shift).unwrap();
                assert!(
                    close(got, value, kind.epsilon()),
                    "{:?} {}: {:?} != {:?}",
                    kind,
                    arch,
                    got,
                    value
                );
            }
        }
    }
    Ok(())
}

#[test]
fn geometry_is_stable() -> Result<()> {
    init();
    let reg = LayoutRegistry::default();
    for &props in &[
        Properties::new(67, Architecture::X86),
        Properties::new(67, Architecture::X64),
        Properties::new(92, Architecture::X64),
        Properties::new(22, Architecture::X86),
    ] {
        let mut c = Container::new(&reg, props)?;
        let table = CompressionTable::Current;
        let kinds: Vec<CodecKind> = CODECS
            .iter()
            .copied()
            .filter(|k| props.version < 56 || table.code(*k).is_some())
            .filter(|k| props.version >= 56 || !k.is_bilinear())
            .filter(|k| props.version >= 56 || *k != CodecKind::LinearRotationQuat4_14bit)
            .collect();
        for n in 1..4 {
            let picked: Vec<CodecKind> = kinds.iter().copied().cycle().take(n * 2).collect();
            let anim = authored(&c, &picked)?;
            c.append_animation(anim)?;
        }
        let mut with_events = c.create_animation();
        if let Events::V1(events) = with_events.create_events() {
            events.group_mut(0).unwrap().events.push(AnimEvent {
                trigger_bits: 1,
                num_frames: 12,
            });
        }
        if let Some(floats) = with_events.create_float_tracks() {
            floats.groups[2].frames.push(FloatFrame::new(3, &[0.5, 0.25]));
        }
        c.append_animation(with_events)?;

        let first = c.save()?;
        let loaded = Container::load(&reg, first.clone())?;
        let size = loaded.animation(0).unwrap().layout().size;
        let offsets: Vec<usize> = loaded.offsets().iter().map(|o| o.unwrap()).collect();
        for pair in offsets.windows(2) {
            assert!(pair[0] + size <= pair[1], "{}: {:?}", props, offsets);
        }
        assert!(offsets.iter().all(|o| o % 16 == 0));
        for (a, b) in c.animations().iter().zip(loaded.animations()) {
            assert_eq!(a, b);
        }

        let second = loaded.save()?;
        assert_eq!(second, first);
        let reloaded = Container::load(&reg, second)?;
        assert_eq!(reloaded.offsets(), loaded.offsets());
        assert_eq!(reloaded.buffer(), Some(&first[..]));
    }
    Ok(())
}

#[test]
fn empty_slot_is_kept() -> Result<()> {
    init();
    let reg = LayoutRegistry::default();
    let mut c = Container::new(&reg, Properties::new(57, Architecture::X86))?;
    let a = authored(&c, &[CodecKind::LinearVector3])?;
    let b = authored(&c, &[CodecKind::StepRotationQuat3, CodecKind::SingleVector3])?;
    c.insert_animation(a, 0, false)?;
    c.insert_animation(b, 2, false)?;
    assert_eq!(c.len(), 3);

    let bytes = c.save()?;
    assert_eq!(&bytes[6..8], &3u16.to_le_bytes());
    assert_eq!(&bytes[12..16], &[0; 4]);

    let loaded = Container::load(&reg, bytes)?;
    assert_eq!(loaded.len(), 3);
    assert!(loaded.animation(1).is_none());
    assert!(loaded.offsets()[1].is_none());
    assert_eq!(loaded.animation(0).unwrap().tracks().len(), 1);
    assert_eq!(loaded.animation(2).unwrap().tracks().len(), 2);
    Ok(())
}

#[test]
fn big_endian_files() -> Result<()> {
    init();
    let reg = LayoutRegistry::default();
    for &props in &[
        Properties::new(49, Architecture::X86),
        Properties::new(66, Architecture::X64),
        Properties::new(92, Architecture::X64),
    ] {
        let mut c = Container::new(&reg, props)?;
        let kinds = [
            CodecKind::SingleVector3,
            CodecKind::LinearVector3,
            CodecKind::StepRotationQuat3,
        ];
        let anim = authored(&c, &kinds)?;
        c.append_animation(anim)?;

        let be = c.save_with(&ExportSettings { big_endian: true })?;
        assert_eq!(&be[..4], b"\0TML");
        let le = c.save()?;
        assert_eq!(be.len(), le.len());

        let loaded = Container::load(&reg, be)?;
        assert_eq!(loaded.properties(), props);
        assert_eq!(loaded.animation(0), c.animation(0));
    }
    Ok(())
}

#[test]
fn detects_pointer_width() -> Result<()> {
    init();
    let reg = LayoutRegistry::default();
    // one slot tables end at 16 for both widths, two slots differ
    for slots in 1..3 {
        for &arch in &[Architecture::X86, Architecture::X64] {
            for &big_endian in &[false, true] {
                let props = Properties::new(67, arch);
                let mut c = Container::new(&reg, props)?;
                for _ in 0..slots {
                    let anim = authored(&c, &[CodecKind::LinearVector3])?;
                    c.append_animation(anim)?;
                }
                let bytes = c.save_with(&ExportSettings { big_endian })?;
                let loaded = Container::load(&reg, bytes)?;
                assert_eq!(loaded.properties(), props, "{} slots, be {}", slots, big_endian);
            }
        }
    }
    Ok(())
}

#[test]
fn import_overrides() -> Result<()> {
    init();
    let reg = LayoutRegistry::default();
    let mut c = Container::new(&reg, Properties::new(66, Architecture::X86))?;
    let anim = authored(&c, &[CodecKind::LinearVector3])?;
    c.append_animation(anim)?;
    let bytes = c.save()?;

    let settings = Settings::from_toml(
        "frame_rate = 30.0\n[import]\narchitecture = \"x86\"\nversion = 67\n",
    )?;
    let loaded = Container::load_with(&reg, bytes, &settings)?;
    assert_eq!(loaded.properties(), Properties::new(67, Architecture::X86));
    let track = &loaded.animation(0).unwrap().tracks()[0];
    assert_eq!(track.frame_rate, 30.0);
    // frame 2 of the keys sits at 3 / 30 seconds after the reference frame
    let v = track.get_value(0.1).unwrap();
    assert!(close(v, keys(CodecKind::LinearVector3)[2].1, 1e-4));
    Ok(())
}

#[test]
fn unknown_version_is_an_error() {
    init();
    let reg = LayoutRegistry::default();
    let mut bytes = b"LMT\0".to_vec();
    bytes.extend_from_slice(&60u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    assert!(matches!(
        Container::load(&reg, bytes),
        Err(Error::InvalidVersion(p)) if p.version == 60
    ));
    assert!(matches!(
        Container::new(&reg, Properties::new(93, Architecture::X64)),
        Err(Error::InvalidVersion(_))
    ));
    assert!(matches!(
        reg.create_animation(Properties::new(300, Architecture::X86)),
        Err(Error::InvalidVersion(_))
    ));
}

#[test]
fn event_triggers_expand_through_remaps() -> Result<()> {
    init();
    let reg = LayoutRegistry::default();
    let mut c = Container::new(&reg, Properties::new(67, Architecture::X64))?;
    let mut anim = c.create_animation();
    if let Events::V1(events) = anim.create_events() {
        let group = events.group_mut(1).unwrap();
        group.remaps[0] = 11;
        group.remaps[5] = 22;
        group.remaps[9] = 33;
        group.events.push(AnimEvent {
            trigger_bits: 0,
            num_frames: 4,
        });
        group.events.push(AnimEvent {
            trigger_bits: 1 | 1 << 5 | 1 << 9,
            num_frames: 2,
        });
    }
    c.append_animation(anim)?;

    let loaded = Container::load(&reg, c.save()?)?;
    let events = loaded.animation(0).unwrap().events().unwrap();
    assert_eq!(events.num_groups(), 4);
    assert_eq!(events.group_event_count(1), Some(2));
    match events {
        Events::V1(events) => {
            assert_eq!(events.get_events(1, 1), Some(vec![11, 22, 33]));
            assert_eq!(events.event_frame(1, 1), Some(4));
            assert_eq!(events.get_events(0, 0), None);
        }
        Events::V2(_) => panic!("v67 stores version 1 events"),
    }
    Ok(())
}

#[test]
fn hashed_events_survive_a_round_trip() -> Result<()> {
    init();
    let reg = LayoutRegistry::default();
    let mut c = Container::new(&reg, Properties::new(92, Architecture::X64))?;
    let mut anim = authored(&c, &[CodecKind::LinearVector3])?;
    if let Events::V2(events) = anim.create_events() {
        events.hash = 0xdead_beef;
        let mut frame = EventFrame::default();
        frame.frame = 1.5;
        frame.set_value(0, EventValue::Float(0.25));
        events.groups.push(EventGroupV2 {
            hash: 7,
            events: vec![EventV2 {
                hash: 9,
                data_type: frame.data_type,
                frames: vec![frame],
            }],
        });
    }
    c.append_animation(anim)?;

    let loaded = Container::load(&reg, c.save_with(&ExportSettings { big_endian: true })?)?;
    match loaded.animation(0).unwrap().events() {
        Some(Events::V2(events)) => {
            assert_eq!(events.hash, 0xdead_beef);
            let frame = &events.groups[0].events[0].frames[0];
            assert_eq!(frame.frame, 1.5);
            assert_eq!(frame.values(), vec![EventValue::Float(0.25)]);
        }
        other => panic!("unexpected events {:?}", other),
    }
    Ok(())
}
