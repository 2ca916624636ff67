/// MIDI output using midir
use midir::{MidiOutput, MidiOutputConnection};

use crate::error::DeviceError;

const CLIENT_NAME: &str = "stepahead MIDI Output";

/// General MIDI percussion channel (10), zero-based.
pub const DRUM_CHANNEL: u8 = 9;

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    channel: u8,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            channel: DRUM_CHANNEL,
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<String, DeviceError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| DeviceError::Midi(format!("Failed to create MIDI output: {}", e)))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or(DeviceError::InvalidPort(port_index))?;
        let name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| format!("port {}", port_index));

        let connection = midi_out
            .connect(port, "stepahead")
            .map_err(|e| DeviceError::Midi(format!("Failed to connect: {}", e)))?;

        self.connection = Some(connection);
        Ok(name)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel.min(15);
    }

    pub fn send_note_on(&mut self, note: u8, velocity: u8) -> Result<(), DeviceError> {
        self.send(&note_on(self.channel, note, velocity))
    }

    pub fn send_note_off(&mut self, note: u8) -> Result<(), DeviceError> {
        self.send(&note_off(self.channel, note))
    }

    fn send(&mut self, message: &[u8]) -> Result<(), DeviceError> {
        if let Some(ref mut conn) = self.connection {
            conn.send(message)
                .map_err(|e| DeviceError::Midi(format!("Failed to send: {}", e)))?;
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn note_on(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [0x90 | (channel & 0x0f), note & 0x7f, velocity & 0x7f]
}

fn note_off(channel: u8, note: u8) -> [u8; 3] {
    [0x80 | (channel & 0x0f), note & 0x7f, 0]
}

/// General MIDI percussion note for a lane name. Unknown names get a rimshot.
pub fn drum_note(lane: &str) -> u8 {
    match lane.to_ascii_lowercase().as_str() {
        "bass" => 35,
        "kick" => 36,
        "rim" | "rimshot" => 37,
        "snare" => 38,
        "clap" => 39,
        "hihat" | "closed_hihat" => 42,
        "open_hihat" => 46,
        "tom" => 45,
        "crash" => 49,
        "ride" => 51,
        "cowbell" => 56,
        _ => 37,
    }
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drum_messages() {
        assert_eq!(note_on(DRUM_CHANNEL, 36, 100), [0x99, 36, 100]);
        assert_eq!(note_off(DRUM_CHANNEL, 36), [0x89, 36, 0]);
        assert_eq!(note_on(0, 200, 255), [0x90, 72, 127]);
    }

    #[test]
    fn test_drum_note() {
        assert_eq!(drum_note("kick"), 36);
        assert_eq!(drum_note("Snare"), 38);
        assert_eq!(drum_note("hihat"), 42);
        assert_eq!(drum_note("theremin"), 37);
    }

    #[test]
    fn test_note_names() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(36), "C2");
        assert_eq!(midi_note_name(42), "F#2");
    }

    #[test]
    fn test_unconnected_send_is_noop() {
        let mut device = MidiOutputDevice::new();
        assert!(!device.is_connected());
        assert!(device.send_note_on(36, 100).is_ok());
        assert!(device.send_note_off(36).is_ok());
    }
}
