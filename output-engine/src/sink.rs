//! Output sinks.
//!
//! The engine hands finished output to a speech sink and a braille sink and
//! never waits for either. The channel-backed sinks push onto unbounded
//! `tokio::sync::mpsc` channels so a synthesizer or display driver can drain
//! them on its own task.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{Channel, ObjectId, OutputUnit, Voice};

/// One piece of speech with its voice hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub voice: Voice,
}

/// One region of a braille line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrailleRegion {
    pub text: String,
    /// The cursor is placed on this region
    pub focused: bool,
    pub source: ObjectId,
}

impl From<&OutputUnit> for Utterance {
    fn from(unit: &OutputUnit) -> Self {
        Self {
            text: unit.text.clone(),
            voice: unit.voice,
        }
    }
}

impl From<&OutputUnit> for BrailleRegion {
    fn from(unit: &OutputUnit) -> Self {
        Self {
            text: unit.text.clone(),
            focused: unit.focused,
            source: unit.source,
        }
    }
}

/// Receives speech output.
pub trait SpeechSink: Send {
    fn speak(&self, utterances: Vec<Utterance>);
}

/// Receives braille output.
pub trait BrailleSink: Send {
    fn display(&self, regions: Vec<BrailleRegion>);
}

/// Speech sink backed by an unbounded channel.
pub struct ChannelSpeechSink {
    tx: mpsc::UnboundedSender<Vec<Utterance>>,
}

impl ChannelSpeechSink {
    /// Creates the sink and the receiver the synthesizer reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<Utterance>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SpeechSink for ChannelSpeechSink {
    fn speak(&self, utterances: Vec<Utterance>) {
        if self.tx.send(utterances).is_err() {
            log::warn!("[SINK] Speech receiver closed; dropping utterances");
        }
    }
}

/// Braille sink backed by an unbounded channel.
pub struct ChannelBrailleSink {
    tx: mpsc::UnboundedSender<Vec<BrailleRegion>>,
}

impl ChannelBrailleSink {
    /// Creates the sink and the receiver the display driver reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<BrailleRegion>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl BrailleSink for ChannelBrailleSink {
    fn display(&self, regions: Vec<BrailleRegion>) {
        if self.tx.send(regions).is_err() {
            log::warn!("[SINK] Braille receiver closed; dropping regions");
        }
    }
}

/// The sinks attached to a dispatcher. Either may be absent.
#[derive(Default)]
pub struct Sinks {
    pub speech: Option<Box<dyn SpeechSink>>,
    pub braille: Option<Box<dyn BrailleSink>>,
}

impl Sinks {
    /// Sends units to the sink of their channel. Empty output is not sent.
    pub fn deliver(&self, channel: Channel, units: &[OutputUnit]) {
        if units.is_empty() {
            return;
        }
        match channel {
            Channel::Speech => {
                if let Some(sink) = &self.speech {
                    sink.speak(units.iter().map(Utterance::from).collect());
                }
            }
            Channel::Braille => {
                if let Some(sink) = &self.braille {
                    sink.display(units.iter().map(BrailleRegion::from).collect());
                }
            }
        }
    }

    /// Whether a sink is attached for `channel`.
    pub fn wants(&self, channel: Channel) -> bool {
        match channel {
            Channel::Speech => self.speech.is_some(),
            Channel::Braille => self.braille.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(text: &str, channel: Channel, focused: bool) -> OutputUnit {
        OutputUnit {
            text: text.to_string(),
            channel,
            source: ObjectId(4),
            focused,
            voice: Voice::System,
        }
    }

    #[test]
    fn test_channel_sinks_forward_batches() {
        let (speech, mut speech_rx) = ChannelSpeechSink::new();
        let (braille, mut braille_rx) = ChannelBrailleSink::new();
        let sinks = Sinks {
            speech: Some(Box::new(speech)),
            braille: Some(Box::new(braille)),
        };

        sinks.deliver(Channel::Speech, &[unit("check box", Channel::Speech, true)]);
        sinks.deliver(Channel::Braille, &[unit("chk", Channel::Braille, true)]);
        sinks.deliver(Channel::Braille, &[]);

        let utterances = speech_rx.try_recv().unwrap();
        assert_eq!(
            utterances,
            vec![Utterance {
                text: "check box".into(),
                voice: Voice::System
            }]
        );
        let regions = braille_rx.try_recv().unwrap();
        assert!(regions[0].focused);
        assert!(braille_rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_does_not_panic() {
        let (speech, rx) = ChannelSpeechSink::new();
        drop(rx);
        speech.speak(vec![Utterance {
            text: "gone".into(),
            voice: Voice::Default,
        }]);
    }

    #[test]
    fn test_missing_sink_is_skipped() {
        let sinks = Sinks::default();
        assert!(!sinks.wants(Channel::Speech));
        sinks.deliver(Channel::Speech, &[unit("ignored", Channel::Speech, false)]);
    }
}
