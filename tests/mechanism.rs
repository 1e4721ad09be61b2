use keypunch::{
    Card, EventQueue, Keypunch, MachineConfig, Mode, Op, Options, PunchState, QueuedEvent,
    RecordingRender,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Action {
    Data(u8),
    MultiPunch(u8),
    Left,
    Right,
    Home,
    Tab,
    Release,
    Drop,
    Wait(u64),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        6 => (b'A'..=b'Z').prop_map(Action::Data),
        1 => (b'0'..=b'9').prop_map(Action::MultiPunch),
        2 => Just(Action::Left),
        2 => Just(Action::Right),
        1 => Just(Action::Home),
        1 => Just(Action::Tab),
        1 => Just(Action::Release),
        1 => Just(Action::Drop),
        3 => (0u64..400).prop_map(Action::Wait),
    ]
}

fn interactive() -> Keypunch<RecordingRender, Vec<Card>> {
    let mut kp = Keypunch::new(
        MachineConfig::default(),
        Options::default(),
        Mode::Interactive,
        RecordingRender::default(),
        Vec::new(),
    )
    .unwrap();
    kp.start();
    kp.run_until_idle().unwrap();
    kp
}

proptest! {
    #[test]
    fn queue_drains_in_arrival_order(delays in prop::collection::vec(0u64..100, 1..50)) {
        let mut q = EventQueue::new();
        for (i, &delay) in delays.iter().enumerate() {
            let armed = q.push(QueuedEvent { op: Op::Data(i as u8), typeahead: false, delay });
            prop_assert_eq!(armed, i == 0);
        }
        let mut seen = Vec::new();
        while let Some(ev) = q.begin() {
            seen.push(ev.op);
            q.finish();
        }
        let expected: Vec<Op> = (0..delays.len()).map(|i| Op::Data(i as u8)).collect();
        prop_assert_eq!(seen, expected);
        prop_assert_eq!(q.peak_in_effect(), 1);
    }

    #[test]
    fn random_keying_keeps_the_mechanism_sane(actions in prop::collection::vec(action(), 1..120)) {
        let mut kp = interactive();
        for a in actions {
            match a {
                Action::Data(c) => kp.key_data(c),
                Action::MultiPunch(c) => kp.key_multipunch(c),
                Action::Left => kp.key_left(),
                Action::Right => kp.key_right(),
                Action::Home => kp.key_home(),
                Action::Tab => kp.key_tab(),
                Action::Release => kp.key_release(),
                Action::Drop => kp.key_drop(),
                Action::Wait(ms) => kp.run_for(ms).unwrap(),
            }
            prop_assert!(kp.column() <= kp.config().columns);
            prop_assert!(kp.queue().peak_in_effect() <= 1);
        }
        kp.run_until_idle().unwrap();

        prop_assert_eq!(kp.punch_state(), PunchState::Registered);
        prop_assert!(kp.queue().is_idle());
        prop_assert_eq!(kp.typeahead_len(), 0);
        prop_assert_eq!(kp.stations().stacker().len(), kp.card_count());
        prop_assert_eq!(kp.render().indicator, kp.column());

        let seqs: Vec<u32> = kp.stations().stacker().iter().map(|c| c.seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        prop_assert_eq!(seqs, sorted);
    }
}

#[test]
fn surfaces_swap_as_cards_advance() {
    let mut kp = interactive();
    let first = kp.stations().punch_surface().id;
    kp.key_release();
    kp.run_until_idle().unwrap();
    assert_ne!(kp.stations().punch_surface().id, first);
    assert_eq!(kp.stations().read_surface().id, first);
    let punch = kp.stations().punch_surface();
    assert_eq!((punch.x, punch.y), (0, 0));
}

#[test]
fn key_lamps_pop_back_up() {
    let mut kp = interactive();
    kp.key_feed();
    kp.key_feed();
    kp.run_until_idle().unwrap();
    let lamps = &kp.render().lamps;
    assert_eq!(lamps.last(), Some(&(keypunch::MachineKey::Feed, false)));
    // Pressing twice leaves a single pending un-press.
    let ups = lamps.iter().filter(|(_, down)| !down).count();
    assert_eq!(ups, 2);
}
