//! Core library for the IBM 029 keypunch simulator: card encoding, the timed
//! card mechanism, typeahead and the paste/auto-play input machines.

mod card;
mod cardimg;
mod clock;
mod config;
mod deck;
mod encoding;
mod error;
mod eventq;
mod fsm;
mod machine;
mod render;
pub mod runloop;
mod station;
mod typeahead;

pub use card::{Card, Column, RenderStyle};
pub use cardimg::{CardField, CardImage, CardImageRegistry};
pub use clock::{MachineKey, TimerId, Timers};
pub use config::{Delays, MachineConfig, Mode, Options, Speed, Switch};
pub use deck::{AuditEvent, CardRecord, CardSink, Deck, DeckHeader};
pub use encoding::{CellMask, Charset, EncodeError, PunchEncoding};
pub use error::{KeypunchError, Result};
pub use eventq::{EventQueue, Op, QueuedEvent};
pub use fsm::{ByteSource, ChannelSource, FileSource, FsmState, InputFsm, MemorySource};
pub use machine::Keypunch;
pub use render::{NullRender, RecordingRender, Render, TraceRender};
pub use runloop::KeyEvent;
pub use station::{PunchState, Stations, Surface, SurfaceId};
pub use typeahead::{KeyInput, TypeaheadBuffer};
