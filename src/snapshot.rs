use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// One timer, flattened to the registers a save point needs.
///
/// Pending control changes are not saved; a restored timer starts from a
/// single state built from these fields.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub latch: u16,
    pub count: u16,
    pub running: bool,
    pub one_shot: bool,
    pub cascade: bool,
}

impl Default for TimerSnapshot {
    fn default() -> Self {
        Self {
            latch: 0xFFFF,
            count: 0xFFFF,
            running: false,
            one_shot: false,
            cascade: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CiaSnapshot {
    pub version: u32,
    /// Clock the snapshot was taken at, before any rebase of the restoring machine.
    pub clock: Clock,
    pub timer_a: TimerSnapshot,
    pub timer_b: TimerSnapshot,
    pub cra: u8,
    pub crb: u8,
    pub icr_mask: u8,
    pub icr_flags: u8,
    #[serde(default)]
    pub irq_active: bool,
}

impl CiaSnapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        bincode::serialize(self).map_err(|e| format!("Failed to serialize CIA snapshot: {}", e))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        let snap: CiaSnapshot = bincode::deserialize(data)
            .map_err(|e| format!("Failed to deserialize CIA snapshot: {}", e))?;
        snap.check_version()?;
        Ok(snap)
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize CIA snapshot: {}", e))
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let snap: CiaSnapshot = serde_json::from_str(json)
            .map_err(|e| format!("Failed to deserialize CIA snapshot: {}", e))?;
        snap.check_version()?;
        Ok(snap)
    }

    fn check_version(&self) -> Result<(), String> {
        if self.version > Self::CURRENT_VERSION {
            return Err(format!(
                "CIA snapshot version {} is not supported (current: {})",
                self.version,
                Self::CURRENT_VERSION
            ));
        }
        Ok(())
    }

    pub fn save_to_file(&self, filename: &str) -> Result<(), Box<dyn std::error::Error>> {
        let data = self.to_bytes()?;
        std::fs::write(filename, data)?;
        log::info!("CIA snapshot written to: {}", filename);
        Ok(())
    }

    pub fn load_from_file(filename: &str) -> Result<CiaSnapshot, Box<dyn std::error::Error>> {
        let data = std::fs::read(filename)?;
        let snap = Self::from_bytes(&data)?;
        log::info!("CIA snapshot loaded from: {}", filename);
        Ok(snap)
    }
}
