//! Persisted backend selection.
//!
//! Record layout: `[STORAGE_MAGIC, outputs, 0, 0, 0, 0, crc_hi, crc_lo]`, CRC16 over the
//! first six bytes. One byte carries both the keyboard and the mouse field.

use hid_proto::{crc16, merge8, split16, OutputBits};
use tracing::{debug, info, warn};

use crate::storage::NonVolatileStorage;

pub const STORAGE_MAGIC: u8 = 0x33;
pub const RECORD_LEN: usize = 8;
/// The record sits at the start of the storage block.
const RECORD_OFFSET: usize = 0;

pub struct OutputRegistry {
    storage: Box<dyn NonVolatileStorage>,
}

impl OutputRegistry {
    pub fn new(storage: Box<dyn NonVolatileStorage>) -> Self {
        Self { storage }
    }

    /// `None` when the record is unreadable, has the wrong magic or fails its CRC.
    pub fn read(&self) -> Option<OutputBits> {
        let mut record = [0u8; RECORD_LEN];
        if let Err(err) = self.storage.read_block(RECORD_OFFSET, &mut record) {
            debug!(%err, "outputs record unreadable");
            return None;
        }
        if record[0] != STORAGE_MAGIC {
            return None;
        }
        if crc16(&record[..6]) != merge8(record[6], record[7]) {
            warn!("outputs record failed its crc check");
            return None;
        }
        Some(OutputBits(record[1]))
    }

    /// Stores `bits` under `mask`. Without `force` the other bits keep their stored value
    /// (zero if nothing valid is stored); with `force` they are cleared.
    pub fn update(&mut self, mask: u8, bits: u8, force: bool) {
        let outputs = if force {
            bits & mask
        } else {
            let old = self.read().map_or(0, |o| o.0);
            (old & !mask) | (bits & mask)
        };

        let mut record = [STORAGE_MAGIC, outputs, 0, 0, 0, 0, 0, 0];
        let (hi, lo) = split16(crc16(&record[..6]));
        record[6] = hi;
        record[7] = lo;

        if let Err(err) = self.storage.update_block(RECORD_OFFSET, &record) {
            warn!(%err, outputs, "failed to persist outputs");
        }
    }

    /// Reads the stored outputs, writing `defaults` first when nothing valid is stored.
    pub fn load_or_init(&mut self, defaults: OutputBits) -> OutputBits {
        if let Some(outputs) = self.read() {
            return outputs;
        }
        info!(outputs = defaults.0, "initializing outputs record");
        self.update(0xFF, defaults.0, true);
        defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, NullStorage};
    use hid_proto::{KeyboardOutput, MouseOutput};

    fn registry() -> (OutputRegistry, MemoryStorage) {
        let mem = MemoryStorage::new(64);
        (OutputRegistry::new(Box::new(mem.clone())), mem)
    }

    #[test]
    fn blank_storage_reads_nothing() {
        let (reg, _) = registry();
        assert_eq!(reg.read(), None);
    }

    #[test]
    fn forced_write_round_trips() {
        let (mut reg, mem) = registry();
        reg.update(0xFF, 0x19, true);
        assert_eq!(reg.read(), Some(OutputBits(0x19)));
        let snap = mem.snapshot();
        assert_eq!(&snap[..6], &[0x33, 0x19, 0, 0, 0, 0]);
        assert_eq!(merge8(snap[6], snap[7]), crc16(&snap[..6]));
    }

    #[test]
    fn masked_update_keeps_other_field() {
        let (mut reg, _) = registry();
        let initial = OutputBits::new(KeyboardOutput::Usb, MouseOutput::UsbAbsolute);
        reg.update(0xFF, initial.0, true);

        reg.update(MouseOutput::MASK, MouseOutput::Ps2.bits(), false);
        let stored = reg.read().unwrap();
        assert_eq!(stored.keyboard(), KeyboardOutput::Usb);
        assert_eq!(stored.mouse(), MouseOutput::Ps2);
    }

    #[test]
    fn keyboard_then_mouse_updates_are_independent() {
        let (mut reg, _) = registry();
        reg.update(KeyboardOutput::MASK, KeyboardOutput::Ps2.bits(), false);
        reg.update(MouseOutput::MASK, MouseOutput::UsbRelative.bits(), false);
        let stored = reg.read().unwrap();
        assert_eq!(stored.keyboard(), KeyboardOutput::Ps2);
        assert_eq!(stored.mouse(), MouseOutput::UsbRelative);
    }

    #[test]
    fn masked_update_on_blank_storage_starts_from_zero() {
        let (mut reg, _) = registry();
        reg.update(KeyboardOutput::MASK, 0xFF, false);
        assert_eq!(reg.read(), Some(OutputBits(0x07)));
    }

    #[test]
    fn corrupt_record_falls_back_to_defaults() {
        let (mut reg, mem) = registry();
        reg.update(0xFF, 0x0B, true);
        mem.poke(1, &[0x1B]).unwrap();
        assert_eq!(reg.read(), None);

        let defaults = OutputBits::new(KeyboardOutput::Ps2, MouseOutput::UsbRelative);
        assert_eq!(reg.load_or_init(defaults), defaults);
        assert_eq!(reg.read(), Some(defaults));
    }

    #[test]
    fn load_or_init_prefers_stored_value() {
        let (mut reg, mem) = registry();
        reg.update(0xFF, 0x13, true);
        let written = mem.bytes_written();
        assert_eq!(reg.load_or_init(OutputBits(0x09)), OutputBits(0x13));
        assert_eq!(mem.bytes_written(), written);
    }

    #[test]
    fn null_storage_always_yields_defaults() {
        let mut reg = OutputRegistry::new(Box::new(NullStorage));
        reg.update(0xFF, 0x13, true);
        assert_eq!(reg.read(), None);
        assert_eq!(reg.load_or_init(OutputBits(0x09)), OutputBits(0x09));
    }
}
