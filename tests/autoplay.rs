use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use keypunch::{
    ByteSource, Card, FsmState, Keypunch, MachineConfig, MemorySource, Mode, NullRender, Options,
    PunchState,
};
use pretty_assertions::assert_eq;

type Machine = Keypunch<NullRender, Vec<Card>>;

fn machine(mode: Mode, options: Options, input: &[u8], chunk: usize) -> Machine {
    Keypunch::new(
        MachineConfig::default(),
        options,
        mode,
        NullRender,
        Vec::new(),
    )
    .unwrap()
    .with_source(Box::new(
        MemorySource::new("test", input.to_vec()).with_chunk(chunk),
    ))
}

fn lines(cards: &[Card]) -> Vec<String> {
    cards
        .iter()
        .map(|c| c.text().trim_end().to_string())
        .collect()
}

fn run_batch(input: &[u8], options: Options) -> Machine {
    let mut kp = machine(Mode::Batch, options, input, 1024);
    kp.start();
    kp.run_until_idle().unwrap();
    kp
}

#[test]
fn batch_punches_one_card_per_line() {
    let kp = run_batch(b"AB\nCD\n", Options::default());
    assert_eq!(lines(kp.sink()), vec!["AB", "CD"]);
    assert_eq!(kp.card_count(), 2);
    assert!(kp.is_halted());
    assert!(!kp.is_powered());
    assert_eq!(kp.autoplay_state(), FsmState::Done);
}

#[test]
fn short_reads_continue_the_line() {
    let mut kp = machine(
        Mode::Batch,
        Options::default(),
        b"HELLO WORLD\nSECOND\n",
        3,
    );
    kp.start();
    kp.run_until_idle().unwrap();
    assert_eq!(lines(kp.sink()), vec!["HELLO WORLD", "SECOND"]);
}

#[test]
fn last_line_without_newline_is_kept() {
    let kp = run_batch(b"ONE\nTWO", Options::default());
    assert_eq!(lines(kp.sink()), vec!["ONE", "TWO"]);
}

#[test]
fn blank_lines_make_blank_cards() {
    let kp = run_batch(b"A\n\nB\n", Options::default());
    assert_eq!(lines(kp.sink()), vec!["A", "", "B"]);
}

#[test]
fn full_line_releases_once() {
    let mut input = vec![b'9'; 80];
    input.push(b'\n');
    input.extend_from_slice(b"NEXT\n");
    let kp = run_batch(&input, Options::default());
    let out = lines(kp.sink());
    assert_eq!(out.len(), 2);
    assert_eq!(out[0], "9".repeat(80));
    assert_eq!(out[1], "NEXT");
}

#[test]
fn long_line_spills_onto_next_card() {
    let mut input = vec![b'X'; 85];
    input.push(b'\n');
    let kp = run_batch(&input, Options::default());
    assert_eq!(lines(kp.sink()), vec!["X".repeat(80), "X".repeat(5)]);
}

#[test]
fn lowercase_folds_and_unknown_bytes_are_skipped() {
    let kp = run_batch(b"a{b\n", Options::default());
    assert_eq!(lines(kp.sink()), vec!["AB"]);
}

#[test]
fn sequence_numbers_step_by_ten() {
    let options = Options {
        autonumber: true,
        ..Options::default()
    };
    let kp = run_batch(b"FIRST\nSECOND\n", options);
    let seqs: Vec<u32> = kp.sink().iter().map(|c| c.seq).collect();
    assert_eq!(seqs, vec![100, 110]);
    let texts = lines(kp.sink());
    assert!(texts[0].ends_with("00000100"));
    assert!(texts[1].ends_with("00000110"));
}

#[test]
fn without_read_station_same_output() {
    let options = Options {
        read_station: false,
        ..Options::default()
    };
    let kp = run_batch(b"AB\nCD\n", options);
    assert_eq!(lines(kp.sink()), vec!["AB", "CD"]);
}

#[test]
fn paste_runs_before_auto_play() {
    let mut kp = machine(Mode::Batch, Options::default(), b"AUTO\n", 1024);
    kp.paste(b"PASTED\n");
    kp.start();
    kp.run_until_idle().unwrap();
    assert_eq!(lines(kp.sink()), vec!["PASTED", "AUTO"]);
}

#[test]
fn interactive_machine_ignores_its_source() {
    let mut kp = machine(Mode::Interactive, Options::default(), b"IGNORED\n", 1024);
    kp.start();
    kp.run_until_idle().unwrap();
    assert!(kp.is_powered());
    assert_eq!(kp.autoplay_state(), FsmState::Read);
    assert!(kp.stations().punch().unwrap().is_blank());
}

/// Source whose contents arrive when the test says so.
#[derive(Clone, Default)]
struct Feed(Rc<RefCell<VecDeque<Option<Vec<u8>>>>>);

impl Feed {
    fn push(&self, bytes: &[u8]) {
        self.0.borrow_mut().push_back(Some(bytes.to_vec()));
    }

    fn close(&self) {
        self.0.borrow_mut().push_back(None);
    }
}

impl ByteSource for Feed {
    fn name(&self) -> &str {
        "feed"
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.0.borrow_mut();
        match queue.pop_front() {
            None => Err(io::ErrorKind::WouldBlock.into()),
            Some(None) => Ok(0),
            Some(Some(mut bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    queue.push_front(Some(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

#[test]
fn remote_control_waits_for_input() {
    let feed = Feed::default();
    let options = Options {
        read_station: false,
        ..Options::default()
    };
    let mut kp = Keypunch::new(
        MachineConfig::default(),
        options,
        Mode::RemoteCtl,
        NullRender,
        Vec::<Card>::new(),
    )
    .unwrap()
    .with_source(Box::new(feed.clone()));
    kp.start();
    kp.run_until_idle().unwrap();
    assert!(kp.awaiting_input());
    assert!(kp.sink().is_empty());

    feed.push(b"HI\n");
    kp.input_ready().unwrap();
    kp.run_until_idle().unwrap();
    assert!(kp.awaiting_input());
    assert_eq!(lines(kp.sink()), vec!["HI"]);
    // Remote control feeds the next card straight away.
    assert!(kp.stations().punch().is_some());

    feed.push(b"THERE\n");
    feed.close();
    kp.input_ready().unwrap();
    kp.run_until_idle().unwrap();
    assert!(kp.is_halted());
    // The card fed after the last line is cleared out blank at shutdown.
    assert_eq!(lines(kp.sink()), vec!["HI", "THERE", ""]);
    assert_eq!(kp.card_count(), 3);
}

#[test]
fn batch_file_feeds_only_when_the_next_line_arrives() {
    let feed = Feed::default();
    let mut kp = Keypunch::new(
        MachineConfig::default(),
        Options::default(),
        Mode::Batch,
        NullRender,
        Vec::<Card>::new(),
    )
    .unwrap()
    .with_source(Box::new(feed.clone()));
    feed.push(b"A\n");
    kp.start();
    kp.run_until_idle().unwrap();
    assert!(kp.awaiting_input());
    assert_eq!(kp.punch_state(), PunchState::Empty);
    assert!(kp.stations().punch().is_none());
    assert_eq!(kp.stations().read().map(|c| c.seq), Some(100));

    feed.push(b"B\n");
    feed.close();
    kp.input_ready().unwrap();
    kp.run_until_idle().unwrap();
    assert!(kp.is_halted());
    assert_eq!(lines(kp.sink()), vec!["A", "B"]);
    let seqs: Vec<u32> = kp.sink().iter().map(|c| c.seq).collect();
    assert_eq!(seqs, vec![100, 110]);
}

struct Broken;

impl ByteSource for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("device gone"))
    }
}

#[test]
fn read_errors_stop_the_machine() {
    let mut kp = Keypunch::new(
        MachineConfig::default(),
        Options::default(),
        Mode::Batch,
        NullRender,
        Vec::<Card>::new(),
    )
    .unwrap()
    .with_source(Box::new(Broken));
    kp.start();
    let err = kp.run_until_idle().unwrap_err();
    assert!(matches!(err, keypunch::KeypunchError::Read { .. }));
}
