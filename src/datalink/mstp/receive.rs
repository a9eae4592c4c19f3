//! MS/TP receive frame state machine
//!
//! Assembles frames one octet at a time, checking the header and data CRCs
//! as it goes. A gap longer than Tframe_abort inside a frame, or a UART
//! error, abandons the frame.

use log::{debug, trace};

use super::{MSTP_BROADCAST_ADDRESS, MSTP_MAX_DATA_LENGTH, MSTP_PREAMBLE_55, MSTP_PREAMBLE_FF};
use crate::util::{DataCrc, HeaderCrc};

/// Receive states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// Waiting for the first preamble octet
    Idle,
    /// Waiting for the second preamble octet
    Preamble,
    /// Receiving the fixed header
    Header,
    /// Receiving data for this station
    Data,
    /// Reading past data that is not for this station or too long
    SkipData,
}

/// A frame addressed to this station or broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Raw frame type; proprietary types are passed through
    pub frame_type: u8,
    pub destination: u8,
    pub source: u8,
    pub data: heapless::Vec<u8, MSTP_MAX_DATA_LENGTH>,
}

/// Outcome of a completed or abandoned frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    ValidFrame(ReceivedFrame),
    /// A good frame for another station, or one too long for the input buffer
    ValidFrameNotForUs { frame_type: u8, destination: u8, source: u8 },
    InvalidFrame,
}

/// Octet-level receive state machine
#[derive(Debug, Clone)]
pub struct ReceiveFsm {
    state: ReceiveState,
    this_station: u8,
    frame_abort: u32,
    buffer_size: usize,
    index: usize,
    header_crc: HeaderCrc,
    data_crc: DataCrc,
    frame_type: u8,
    destination: u8,
    source: u8,
    data_length: usize,
    data: heapless::Vec<u8, MSTP_MAX_DATA_LENGTH>,
}

impl ReceiveFsm {
    pub fn new(this_station: u8, frame_abort: u32) -> Self {
        Self::with_buffer_size(this_station, frame_abort, MSTP_MAX_DATA_LENGTH)
    }

    /// A receiver whose input buffer holds `buffer_size` octets (at most 501);
    /// longer frames are skipped.
    pub fn with_buffer_size(this_station: u8, frame_abort: u32, buffer_size: usize) -> Self {
        Self {
            state: ReceiveState::Idle,
            this_station,
            frame_abort,
            buffer_size: buffer_size.min(MSTP_MAX_DATA_LENGTH),
            index: 0,
            header_crc: HeaderCrc::new(),
            data_crc: DataCrc::new(),
            frame_type: 0,
            destination: 0,
            source: 0,
            data_length: 0,
            data: heapless::Vec::new(),
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    fn for_us(&self) -> bool {
        self.destination == self.this_station || self.destination == MSTP_BROADCAST_ADDRESS
    }

    /// Abandon a partial frame once the line has been silent for longer
    /// than Tframe_abort.
    pub fn check_timeout(&mut self, silence: u32) -> Option<ReceiveEvent> {
        if silence <= self.frame_abort {
            return None;
        }
        match self.state {
            ReceiveState::Idle => None,
            ReceiveState::Preamble => {
                self.state = ReceiveState::Idle;
                None
            }
            ReceiveState::Header | ReceiveState::Data | ReceiveState::SkipData => {
                debug!(
                    "MS/TP Rx: frame abort in {:?} after {} ms silence",
                    self.state, silence
                );
                self.state = ReceiveState::Idle;
                Some(ReceiveEvent::InvalidFrame)
            }
        }
    }

    /// A framing, parity or overrun error from the UART
    pub fn receive_error(&mut self) -> Option<ReceiveEvent> {
        let previous = self.state;
        self.state = ReceiveState::Idle;
        match previous {
            ReceiveState::Idle | ReceiveState::Preamble => None,
            _ => {
                debug!("MS/TP Rx: receive error in {:?}", previous);
                Some(ReceiveEvent::InvalidFrame)
            }
        }
    }

    /// Feed one octet. `silence` is how long the line was quiet before it.
    ///
    /// A timed-out partial frame is reported before the octet is taken as
    /// the possible start of a new one.
    pub fn receive_octet(&mut self, octet: u8, silence: u32) -> Option<ReceiveEvent> {
        let aborted = self.check_timeout(silence);
        let event = self.octet(octet);
        aborted.or(event)
    }

    fn octet(&mut self, octet: u8) -> Option<ReceiveEvent> {
        match self.state {
            ReceiveState::Idle => {
                if octet == MSTP_PREAMBLE_55 {
                    self.state = ReceiveState::Preamble;
                }
                None
            }
            ReceiveState::Preamble => {
                match octet {
                    MSTP_PREAMBLE_FF => {
                        self.index = 0;
                        self.header_crc = HeaderCrc::new();
                        self.state = ReceiveState::Header;
                    }
                    // repeated first preamble octet
                    MSTP_PREAMBLE_55 => {}
                    _ => self.state = ReceiveState::Idle,
                }
                None
            }
            ReceiveState::Header => self.header_octet(octet),
            ReceiveState::Data | ReceiveState::SkipData => self.data_octet(octet),
        }
    }

    fn header_octet(&mut self, octet: u8) -> Option<ReceiveEvent> {
        self.header_crc.update(octet);
        match self.index {
            0 => self.frame_type = octet,
            1 => self.destination = octet,
            2 => self.source = octet,
            3 => self.data_length = (octet as usize) << 8,
            4 => self.data_length |= octet as usize,
            _ => return self.header_complete(),
        }
        self.index += 1;
        None
    }

    fn header_complete(&mut self) -> Option<ReceiveEvent> {
        self.state = ReceiveState::Idle;
        if !self.header_crc.is_valid() {
            debug!("MS/TP Rx: bad header CRC");
            return Some(ReceiveEvent::InvalidFrame);
        }

        if self.data_length == 0 {
            trace!(
                "MS/TP Rx: frame type {} {} -> {}",
                self.frame_type,
                self.source,
                self.destination
            );
            return Some(if self.for_us() {
                ReceiveEvent::ValidFrame(ReceivedFrame {
                    frame_type: self.frame_type,
                    destination: self.destination,
                    source: self.source,
                    data: heapless::Vec::new(),
                })
            } else {
                self.not_for_us()
            });
        }

        self.state = if !self.for_us() {
            ReceiveState::SkipData
        } else if self.data_length > self.buffer_size {
            debug!(
                "MS/TP Rx: frame of {} octets exceeds the input buffer",
                self.data_length
            );
            ReceiveState::SkipData
        } else {
            ReceiveState::Data
        };
        self.index = 0;
        self.data_crc = DataCrc::new();
        self.data.clear();
        None
    }

    fn data_octet(&mut self, octet: u8) -> Option<ReceiveEvent> {
        self.data_crc.update(octet);
        if self.index < self.data_length {
            if self.state == ReceiveState::Data {
                // room was checked against data_length in the header
                let _ = self.data.push(octet);
            }
            self.index += 1;
            return None;
        }
        if self.index == self.data_length {
            // first CRC octet
            self.index += 1;
            return None;
        }

        let skipped = self.state == ReceiveState::SkipData;
        self.state = ReceiveState::Idle;
        if !self.data_crc.is_valid() {
            debug!("MS/TP Rx: bad data CRC");
            return Some(ReceiveEvent::InvalidFrame);
        }
        trace!(
            "MS/TP Rx: frame type {} {} -> {}, {} octets",
            self.frame_type,
            self.source,
            self.destination,
            self.data_length
        );
        if skipped {
            return Some(self.not_for_us());
        }
        Some(ReceiveEvent::ValidFrame(ReceivedFrame {
            frame_type: self.frame_type,
            destination: self.destination,
            source: self.source,
            data: std::mem::take(&mut self.data),
        }))
    }

    fn not_for_us(&self) -> ReceiveEvent {
        ReceiveEvent::ValidFrameNotForUs {
            frame_type: self.frame_type,
            destination: self.destination,
            source: self.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::mstp::{MstpFrame, MstpFrameType};

    fn feed(fsm: &mut ReceiveFsm, bytes: &[u8]) -> Vec<ReceiveEvent> {
        bytes
            .iter()
            .filter_map(|&b| fsm.receive_octet(b, 0))
            .collect()
    }

    #[test]
    fn test_token_for_us() {
        let mut fsm = ReceiveFsm::new(0x10, 95);
        let events = feed(&mut fsm, &MstpFrame::token(0x10, 0x05).encode());
        assert_eq!(
            events,
            vec![ReceiveEvent::ValidFrame(ReceivedFrame {
                frame_type: 0,
                destination: 0x10,
                source: 0x05,
                data: heapless::Vec::new(),
            })]
        );
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }

    #[test]
    fn test_data_frame_with_leading_noise() {
        let mut fsm = ReceiveFsm::new(1, 95);
        let frame = MstpFrame::bacnet_data(1, 2, &[0x01, 0x22, 0x30], true).unwrap();
        let mut bytes = vec![0x00, 0x55, 0x55];
        // the repeated 0x55 belongs to the preamble
        bytes.extend_from_slice(&frame.encode()[1..]);
        let events = feed(&mut fsm, &bytes);
        assert_eq!(events.len(), 1);
        let ReceiveEvent::ValidFrame(received) = &events[0] else {
            panic!("expected a valid frame, got {:?}", events[0]);
        };
        assert_eq!(received.frame_type, MstpFrameType::BacnetDataExpectingReply as u8);
        assert_eq!(received.data.as_slice(), &[0x01, 0x22, 0x30]);
    }

    #[test]
    fn test_broadcast_is_for_us() {
        let mut fsm = ReceiveFsm::new(1, 95);
        let frame = MstpFrame::bacnet_data(255, 2, &[0x01, 0x00], false).unwrap();
        let events = feed(&mut fsm, &frame.encode());
        assert!(matches!(events[..], [ReceiveEvent::ValidFrame(_)]));
    }

    #[test]
    fn test_frame_for_other_station() {
        let mut fsm = ReceiveFsm::new(1, 95);
        let mut bytes = MstpFrame::token(7, 2).encode();
        bytes.extend(MstpFrame::bacnet_data(7, 2, &[0xAA; 10], false).unwrap().encode());
        let events = feed(&mut fsm, &bytes);
        assert_eq!(
            events,
            vec![
                ReceiveEvent::ValidFrameNotForUs {
                    frame_type: 0,
                    destination: 7,
                    source: 2
                },
                ReceiveEvent::ValidFrameNotForUs {
                    frame_type: 6,
                    destination: 7,
                    source: 2
                },
            ]
        );
    }

    #[test]
    fn test_bad_header_crc() {
        let mut fsm = ReceiveFsm::new(1, 95);
        let mut bytes = MstpFrame::token(1, 2).encode();
        bytes[7] ^= 0x01;
        assert_eq!(feed(&mut fsm, &bytes), vec![ReceiveEvent::InvalidFrame]);
    }

    #[test]
    fn test_bad_data_crc() {
        let mut fsm = ReceiveFsm::new(1, 95);
        let mut bytes = MstpFrame::bacnet_data(1, 2, &[1, 2, 3], false)
            .unwrap()
            .encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert_eq!(feed(&mut fsm, &bytes), vec![ReceiveEvent::InvalidFrame]);
    }

    #[test]
    fn test_frame_too_long_is_skipped() {
        let mut fsm = ReceiveFsm::with_buffer_size(1, 95, 4);
        let bytes = MstpFrame::bacnet_data(1, 2, &[0u8; 8], false)
            .unwrap()
            .encode();
        assert!(matches!(
            feed(&mut fsm, &bytes)[..],
            [ReceiveEvent::ValidFrameNotForUs { .. }]
        ));
    }

    #[test]
    fn test_frame_abort_timeout() {
        let mut fsm = ReceiveFsm::new(1, 95);
        let bytes = MstpFrame::bacnet_data(1, 2, &[1, 2, 3], false)
            .unwrap()
            .encode();
        assert!(feed(&mut fsm, &bytes[..9]).is_empty());
        assert_eq!(fsm.state(), ReceiveState::Data);

        assert_eq!(fsm.check_timeout(95), None);
        assert_eq!(fsm.check_timeout(96), Some(ReceiveEvent::InvalidFrame));
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }

    #[test]
    fn test_late_octet_starts_new_frame() {
        let mut fsm = ReceiveFsm::new(1, 95);
        let bytes = MstpFrame::token(1, 2).encode();
        feed(&mut fsm, &bytes[..4]);
        assert_eq!(fsm.state(), ReceiveState::Header);

        // the abort is reported and the octet begins a new preamble
        assert_eq!(
            fsm.receive_octet(0x55, 200),
            Some(ReceiveEvent::InvalidFrame)
        );
        assert_eq!(fsm.state(), ReceiveState::Preamble);
        assert_eq!(
            feed(&mut fsm, &bytes[1..]).len(),
            1
        );
    }

    #[test]
    fn test_receive_error() {
        let mut fsm = ReceiveFsm::new(1, 95);
        feed(&mut fsm, &[0x55]);
        assert_eq!(fsm.receive_error(), None);
        feed(&mut fsm, &[0x55, 0xFF, 0x00]);
        assert_eq!(fsm.receive_error(), Some(ReceiveEvent::InvalidFrame));
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }
}
