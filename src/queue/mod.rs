// Sequenced update queue: ordering decisions and the producer ingress buffer

mod ingress;
mod sequencer;

pub(crate) use ingress::Ingress;
pub use sequencer::{Admission, Admitted, BufferOutcome, Sequencer};
