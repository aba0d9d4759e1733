use std::fmt;
use std::sync::Arc;

use util::sync::Mutex;

/// Sequencer hands out RTP sequence numbers for one outgoing source.
pub trait Sequencer: fmt::Debug {
    fn next_sequence_number(&self) -> u16;
    /// roll_over_count is how many times the 16 bit sequence number has wrapped.
    fn roll_over_count(&self) -> u64;
    fn clone_to(&self) -> Box<dyn Sequencer + Send + Sync>;
}

impl Clone for Box<dyn Sequencer + Send + Sync> {
    fn clone(&self) -> Box<dyn Sequencer + Send + Sync> {
        self.clone_to()
    }
}

/// new_random_sequencer starts at a random sequence number in 1..=0x7FFF, as a
/// freshly started sender does.
pub fn new_random_sequencer() -> impl Sequencer {
    let first = rand::random::<u16>() % 0x7FFF + 1;
    new_fixed_sequencer(first)
}

/// new_fixed_sequencer returns `first` from its first call.
pub fn new_fixed_sequencer(first: u16) -> impl Sequencer {
    SequencerImpl(Arc::new(Mutex::new(SequencerInternal {
        sequence_number: first.wrapping_sub(1),
        roll_over_count: 0,
    })))
}

#[derive(Debug)]
struct SequencerInternal {
    sequence_number: u16,
    roll_over_count: u64,
}

#[derive(Debug, Clone)]
struct SequencerImpl(Arc<Mutex<SequencerInternal>>);

impl Sequencer for SequencerImpl {
    fn next_sequence_number(&self) -> u16 {
        let mut s = self.0.lock();
        s.sequence_number = s.sequence_number.wrapping_add(1);
        if s.sequence_number == 0 {
            s.roll_over_count += 1;
        }
        s.sequence_number
    }

    fn roll_over_count(&self) -> u64 {
        self.0.lock().roll_over_count
    }

    fn clone_to(&self) -> Box<dyn Sequencer + Send + Sync> {
        Box::new(self.clone())
    }
}
