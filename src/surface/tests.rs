//! Tests for the surface: routing, safety sweep and end-to-end wire bytes

use super::*;
use crate::geometry::Point;
use crate::transport::MemorySink;
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn make_surface(config: &SurfaceConfig) -> (Surface, MemorySink) {
    let slot = SinkSlot::new();
    let sink = MemorySink::new("test_out");
    slot.select(Box::new(sink.clone()));
    (Surface::new(config, slot), sink)
}

fn default_surface() -> (Surface, MemorySink) {
    make_surface(&SurfaceConfig::default())
}

fn down(surface: &mut Surface, id: u64, x: f64, y: f64, now: Instant) -> Vec<MidiMessage> {
    surface.handle(&ContactEvent::start(ContactId(id), Point::new(x, y), now))
}

fn up(surface: &mut Surface, id: u64, now: Instant) -> Vec<MidiMessage> {
    surface.handle(&ContactEvent::end(ContactId(id), now))
}

// Default layout landmarks
const PATTERN_C: (f64, f64) = (50.0, 50.0);
const PATTERN_D: (f64, f64) = (190.0, 50.0);
const LOOP: (f64, f64) = (1235.0, 50.0);
const PITCH_X: f64 = 50.0;
const MOD_X: f64 = 130.0;
/// Middle C on the upper keyboard, clear of the C# above it
const KEY_60_X: f64 = 200.0;

#[test]
fn test_pattern_exclusive_switch_wire_bytes() {
    let (mut surface, sink) = default_surface();
    let now = Instant::now();

    down(&mut surface, 1, PATTERN_C.0, PATTERN_C.1, now);
    up(&mut surface, 1, now);
    down(&mut surface, 2, PATTERN_D.0, PATTERN_D.1, now);
    up(&mut surface, 2, now);

    assert_eq!(
        sink.sent(),
        vec![vec![0x90, 24, 100], vec![0x80, 24, 0], vec![0x90, 26, 100]]
    );
}

#[test]
fn test_key_velocity_top_and_bottom() {
    let (mut surface, sink) = default_surface();
    let now = Instant::now();

    down(&mut surface, 1, KEY_60_X, 100.0, now);
    up(&mut surface, 1, now);
    down(&mut surface, 2, KEY_60_X, 430.0, now);
    up(&mut surface, 2, now);

    assert_eq!(
        sink.sent(),
        vec![
            vec![0x90, 60, 1],
            vec![0x80, 60, 0],
            vec![0x90, 60, 127],
            vec![0x80, 60, 0],
        ]
    );
}

#[test]
fn test_contact_stays_with_starting_widget() {
    let (mut surface, _sink) = default_surface();
    let now = Instant::now();

    down(&mut surface, 1, KEY_60_X, 300.0, now);

    // Dragging over the patterns panel triggers nothing there
    let out = surface.handle(&ContactEvent::moved(
        ContactId(1),
        Point::new(PATTERN_C.0, PATTERN_C.1),
        now,
    ));
    assert!(out.is_empty());

    assert_eq!(up(&mut surface, 1, now), vec![MidiMessage::NoteOff { channel: 0, note: 60 }]);
    assert_eq!(surface.active_contacts(), 0);
}

#[test]
fn test_multitouch_chord() {
    let (mut surface, _sink) = default_surface();
    let now = Instant::now();

    // C, E and G on the upper keyboard (white keys 72 wide from x=180)
    for (id, x) in [(1, 200.0), (2, 350.0), (3, 500.0)] {
        assert_eq!(down(&mut surface, id, x, 400.0, now).len(), 1);
    }

    match surface.widget("upper") {
        Some(Widget::Keyboard(k)) => assert_eq!(k.held_notes(), vec![60, 64, 67]),
        other => panic!("expected keyboard, got {:?}", other),
    }

    up(&mut surface, 2, now);
    match surface.widget("upper") {
        Some(Widget::Keyboard(k)) => assert_eq!(k.held_notes(), vec![60, 67]),
        other => panic!("expected keyboard, got {:?}", other),
    }
}

#[test]
fn test_restart_of_tracked_contact_releases_first() {
    let (mut surface, sink) = default_surface();
    let now = Instant::now();

    down(&mut surface, 1, KEY_60_X, 300.0, now);

    // The end for contact 1 was lost; it starts again on a pattern button
    let out = down(&mut surface, 1, PATTERN_C.0, PATTERN_C.1, now);
    assert_eq!(
        out,
        vec![
            MidiMessage::NoteOff { channel: 0, note: 60 },
            MidiMessage::NoteOn { channel: 0, note: 24, velocity: 100 },
        ]
    );
    assert_eq!(sink.sent().len(), 3);
    assert_eq!(surface.active_contacts(), 1);
}

#[test]
fn test_start_on_empty_space_is_ignored() {
    let (mut surface, sink) = default_surface();
    let now = Instant::now();

    assert!(down(&mut surface, 1, 870.0, 50.0, now).is_empty());
    // Gap between two pattern buttons
    assert!(down(&mut surface, 2, 85.0, 50.0, now).is_empty());
    assert_eq!(surface.active_contacts(), 0);

    assert!(up(&mut surface, 1, now).is_empty());
    assert!(sink.sent().is_empty());
}

#[test]
fn test_announce_sends_mod_rest_value() {
    let (mut surface, sink) = default_surface();
    surface.announce();
    assert_eq!(sink.sent(), vec![vec![0xB0, 1, 0]]);
}

#[test]
fn test_pitch_drag_and_spring_back() {
    let (mut surface, sink) = default_surface();
    let t0 = Instant::now();

    down(&mut surface, 1, PITCH_X, 100.0, t0);
    surface.handle(&ContactEvent::moved(
        ContactId(1),
        Point::new(PITCH_X, 780.0),
        t0 + Duration::from_millis(20),
    ));
    // Released inside the throttle window, still sent
    up(&mut surface, 1, t0 + Duration::from_millis(21));

    assert_eq!(
        sink.sent(),
        vec![
            vec![0xE0, 0x7F, 0x7F],
            vec![0xE0, 0x00, 0x00],
            vec![0xE0, 0x00, 0x40],
        ]
    );
}

#[test]
fn test_mod_wheel_is_throttled() {
    let (mut surface, sink) = default_surface();
    let t0 = Instant::now();

    down(&mut surface, 1, MOD_X, 780.0, t0);
    for ms in 1..15 {
        surface.handle(&ContactEvent::moved(
            ContactId(1),
            Point::new(MOD_X, 780.0 - ms as f64 * 10.0),
            t0 + Duration::from_millis(ms),
        ));
    }
    surface.handle(&ContactEvent::moved(
        ContactId(1),
        Point::new(MOD_X, 100.0),
        t0 + Duration::from_millis(15),
    ));
    up(&mut surface, 1, t0 + Duration::from_millis(16));

    assert_eq!(sink.sent(), vec![vec![0xB0, 1, 0], vec![0xB0, 1, 127]]);
}

#[test]
fn test_focus_loss_releases_contact_scoped_bindings() {
    let (mut surface, sink) = default_surface();
    let now = Instant::now();

    down(&mut surface, 1, PATTERN_C.0, PATTERN_C.1, now);
    up(&mut surface, 1, now);
    down(&mut surface, 2, LOOP.0, LOOP.1, now);
    up(&mut surface, 2, now);
    down(&mut surface, 3, PITCH_X, 100.0, now);
    down(&mut surface, 4, KEY_60_X, 300.0, now);
    sink.clear();

    let out = surface.focus_lost();
    assert_eq!(
        out,
        vec![
            MidiMessage::PitchBend { channel: 0, value: 8192 },
            MidiMessage::NoteOff { channel: 0, note: 60 },
        ]
    );
    assert_eq!(sink.sent(), vec![vec![0xE0, 0x00, 0x40], vec![0x80, 60, 0]]);
    assert_eq!(surface.active_contacts(), 0);

    match surface.widget("patterns") {
        Some(Widget::Buttons(b)) => assert_eq!(b.active_member("pink"), Some("C")),
        other => panic!("expected buttons, got {:?}", other),
    }
    match surface.widget("transport") {
        Some(Widget::Buttons(b)) => {
            let idx = b.index_of("Loop").unwrap();
            assert!(b.is_latched(idx));
        }
        other => panic!("expected buttons, got {:?}", other),
    }

    // Late ends for swept contacts produce nothing
    assert!(up(&mut surface, 4, now).is_empty());
    assert!(up(&mut surface, 3, now).is_empty());
}

#[test]
fn test_focus_loss_sweep_can_be_disabled() {
    let mut config = SurfaceConfig::default();
    config.safety.release_on_focus_loss = false;
    let (mut surface, _sink) = make_surface(&config);
    let now = Instant::now();

    down(&mut surface, 1, KEY_60_X, 300.0, now);
    assert!(surface.focus_lost().is_empty());
    assert_eq!(up(&mut surface, 1, now).len(), 1);
}

#[test]
fn test_disconnected_sink_does_not_block_widgets() {
    let mut surface = Surface::new(&SurfaceConfig::default(), SinkSlot::new());
    let now = Instant::now();

    assert_eq!(down(&mut surface, 1, KEY_60_X, 300.0, now).len(), 1);
    assert_eq!(up(&mut surface, 1, now).len(), 1);
    assert!(!surface.sink().is_connected());
}

#[test]
fn test_apply_config_releases_then_rebuilds() {
    let (mut surface, _sink) = default_surface();
    let now = Instant::now();

    down(&mut surface, 1, KEY_60_X, 300.0, now);

    let mut config = SurfaceConfig::default();
    config.widgets.retain(|w| w.name() != "lower");
    let out = surface.apply_config(&config);

    assert_eq!(
        out,
        vec![
            MidiMessage::NoteOff { channel: 0, note: 60 },
            MidiMessage::ControlChange { channel: 0, cc: 1, value: 0 },
        ]
    );
    assert_eq!(surface.widgets().len(), 5);
    assert!(surface.widget("lower").is_none());
    assert!(up(&mut surface, 1, now).is_empty());
}

#[test]
fn test_apply_config_turns_off_exclusive_member_and_latch() {
    let (mut surface, sink) = default_surface();
    let now = Instant::now();

    down(&mut surface, 1, PATTERN_C.0, PATTERN_C.1, now);
    up(&mut surface, 1, now);
    down(&mut surface, 2, LOOP.0, LOOP.1, now);
    up(&mut surface, 2, now);

    surface.apply_config(&SurfaceConfig::default());

    // The rebuilt panel starts with no active member, so D is a plain note on
    down(&mut surface, 3, PATTERN_D.0, PATTERN_D.1, now);
    up(&mut surface, 3, now);

    assert_eq!(
        sink.sent(),
        vec![
            vec![0x90, 24, 100],
            vec![0xB0, 117, 127],
            vec![0x80, 24, 0],
            vec![0xB0, 117, 0],
            vec![0xB0, 1, 0],
            vec![0x90, 26, 100],
        ]
    );
}

#[test]
fn test_apply_config_announces_new_rest_values() {
    let (mut surface, sink) = default_surface();
    let now = Instant::now();

    // Mod wheel pushed to the top
    down(&mut surface, 1, MOD_X, 100.0, now);
    up(&mut surface, 1, now);
    sink.clear();

    let out = surface.apply_config(&SurfaceConfig::default());
    assert_eq!(out, vec![MidiMessage::ControlChange { channel: 0, cc: 1, value: 0 }]);
    assert_eq!(sink.sent(), vec![vec![0xB0, 1, 0]]);
}

#[test]
fn test_sliders_throttle_independently() {
    let (mut surface, sink) = default_surface();
    let t0 = Instant::now();

    down(&mut surface, 1, PITCH_X, 100.0, t0);
    down(&mut surface, 2, MOD_X, 100.0, t0 + Duration::from_millis(1));
    surface.handle(&ContactEvent::moved(
        ContactId(1),
        Point::new(PITCH_X, 780.0),
        t0 + Duration::from_millis(20),
    ));
    // Inside the mod wheel's own window, dropped
    surface.handle(&ContactEvent::moved(
        ContactId(2),
        Point::new(MOD_X, 780.0),
        t0 + Duration::from_millis(10),
    ));

    assert_eq!(
        sink.sent(),
        vec![
            vec![0xE0, 0x7F, 0x7F],
            vec![0xB0, 1, 127],
            vec![0xE0, 0x00, 0x00],
        ]
    );
}

#[test]
fn test_mouse_and_touch_coexist() {
    let (mut surface, _sink) = default_surface();
    let now = Instant::now();

    surface.handle(&ContactEvent::start(ContactId::MOUSE, Point::new(KEY_60_X, 300.0), now));
    down(&mut surface, 0, 350.0, 300.0, now);
    assert_eq!(surface.active_contacts(), 2);

    let out = surface.handle(&ContactEvent::end(ContactId::MOUSE, now));
    assert_eq!(out, vec![MidiMessage::NoteOff { channel: 0, note: 60 }]);
}

proptest! {
    #[test]
    fn prop_focus_loss_balances_every_note(
        touches in prop::collection::vec((0u64..6, 180.0f64..1260.0, 100.0f64..780.0, any::<bool>()), 1..40)
    ) {
        let (mut surface, _sink) = default_surface();
        let now = Instant::now();
        let mut ons = 0usize;
        let mut offs = 0usize;

        let mut count = |out: Vec<MidiMessage>| {
            for m in out {
                match m {
                    MidiMessage::NoteOn { .. } => ons += 1,
                    MidiMessage::NoteOff { .. } => offs += 1,
                    _ => {}
                }
            }
        };

        for (id, x, y, lift) in touches {
            count(down(&mut surface, id, x, y, now));
            if lift {
                count(up(&mut surface, id, now));
            }
        }
        count(surface.focus_lost());

        prop_assert_eq!(ons, offs);
        prop_assert_eq!(surface.active_contacts(), 0);
    }
}
