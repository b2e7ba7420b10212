//! HTTP/2 SETTINGS parameters (RFC 7540 Section 6.5)
//!
//! A sparse mapping from the fixed identifier enumeration to validated
//! values. Out-of-range values are rejected at the point of assignment, not
//! at use, so a populated [`Settings`] is always internally valid.

use crate::error::{Error, Result};
use crate::{MAX_FRAME_SIZE_UPPER_BOUND, MAX_WINDOW_SIZE};
use std::fmt;

/// Settings identifiers (RFC 7540 Section 6.5.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingId {
    /// SETTINGS_HEADER_TABLE_SIZE (0x1)
    HeaderTableSize = 0x1,
    /// SETTINGS_ENABLE_PUSH (0x2)
    EnablePush = 0x2,
    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3)
    MaxConcurrentStreams = 0x3,
    /// SETTINGS_INITIAL_WINDOW_SIZE (0x4)
    InitialWindowSize = 0x4,
    /// SETTINGS_MAX_FRAME_SIZE (0x5)
    MaxFrameSize = 0x5,
    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x6)
    MaxHeaderListSize = 0x6,
}

impl SettingId {
    /// Convert to u16
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Create from u16; `None` for identifiers outside the enumeration
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1 => Some(SettingId::HeaderTableSize),
            0x2 => Some(SettingId::EnablePush),
            0x3 => Some(SettingId::MaxConcurrentStreams),
            0x4 => Some(SettingId::InitialWindowSize),
            0x5 => Some(SettingId::MaxFrameSize),
            0x6 => Some(SettingId::MaxHeaderListSize),
            _ => None,
        }
    }

    /// Get parameter name
    pub fn name(&self) -> &'static str {
        match self {
            SettingId::HeaderTableSize => "HEADER_TABLE_SIZE",
            SettingId::EnablePush => "ENABLE_PUSH",
            SettingId::MaxConcurrentStreams => "MAX_CONCURRENT_STREAMS",
            SettingId::InitialWindowSize => "INITIAL_WINDOW_SIZE",
            SettingId::MaxFrameSize => "MAX_FRAME_SIZE",
            SettingId::MaxHeaderListSize => "MAX_HEADER_LIST_SIZE",
        }
    }
}

impl fmt::Display for SettingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u16())
    }
}

/// Sparse, validated HTTP/2 settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    header_table_size: Option<u32>,
    enable_push: Option<bool>,
    max_concurrent_streams: Option<u32>,
    initial_window_size: Option<u32>,
    max_frame_size: Option<u32>,
    max_header_list_size: Option<u32>,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Settings::default()
    }

    /// Whether no parameter is present
    pub fn is_empty(&self) -> bool {
        self.header_table_size.is_none()
            && self.enable_push.is_none()
            && self.max_concurrent_streams.is_none()
            && self.initial_window_size.is_none()
            && self.max_frame_size.is_none()
            && self.max_header_list_size.is_none()
    }

    /// Number of parameters present
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Header table size, if present
    pub fn header_table_size(&self) -> Option<u32> {
        self.header_table_size
    }

    /// Set header table size (any u32 is valid)
    pub fn set_header_table_size(&mut self, value: u32) {
        self.header_table_size = Some(value);
    }

    /// Server push enablement, if present
    pub fn enable_push(&self) -> Option<bool> {
        self.enable_push
    }

    /// Set server push enablement
    pub fn set_enable_push(&mut self, value: bool) {
        self.enable_push = Some(value);
    }

    /// Maximum concurrent streams, if present
    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    /// Set maximum concurrent streams (any u32 is valid)
    pub fn set_max_concurrent_streams(&mut self, value: u32) {
        self.max_concurrent_streams = Some(value);
    }

    /// Initial flow-control window size, if present
    pub fn initial_window_size(&self) -> Option<u32> {
        self.initial_window_size
    }

    /// Set initial window size; rejects values above 2^31-1
    pub fn set_initial_window_size(&mut self, value: u32) -> Result<()> {
        if value as i64 > MAX_WINDOW_SIZE {
            return Err(Error::connection(
                crate::ErrorCode::FlowControlError,
                format!("initial window size {} exceeds 2^31-1", value),
            ));
        }
        self.initial_window_size = Some(value);
        Ok(())
    }

    /// Maximum frame payload size, if present
    pub fn max_frame_size(&self) -> Option<u32> {
        self.max_frame_size
    }

    /// Set maximum frame size; rejects values outside 16384..=16777215
    pub fn set_max_frame_size(&mut self, value: u32) -> Result<()> {
        if !(crate::DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_UPPER_BOUND).contains(&value) {
            return Err(Error::protocol(format!(
                "max frame size {} outside 16384..=16777215",
                value
            )));
        }
        self.max_frame_size = Some(value);
        Ok(())
    }

    /// Maximum header list size, if present
    pub fn max_header_list_size(&self) -> Option<u32> {
        self.max_header_list_size
    }

    /// Set maximum header list size (any u32 is valid)
    pub fn set_max_header_list_size(&mut self, value: u32) {
        self.max_header_list_size = Some(value);
    }

    /// Assign a raw identifier/value pair as read off the wire
    ///
    /// Unknown identifiers are ignored per RFC 7540 Section 6.5.2. Returns
    /// the validation error for out-of-range values of known identifiers.
    pub fn apply_raw(&mut self, id: u16, value: u32) -> Result<()> {
        match SettingId::from_u16(id) {
            Some(SettingId::HeaderTableSize) => self.set_header_table_size(value),
            Some(SettingId::EnablePush) => {
                if value > 1 {
                    return Err(Error::protocol(format!(
                        "ENABLE_PUSH must be 0 or 1, got {}",
                        value
                    )));
                }
                self.set_enable_push(value == 1);
            }
            Some(SettingId::MaxConcurrentStreams) => self.set_max_concurrent_streams(value),
            Some(SettingId::InitialWindowSize) => self.set_initial_window_size(value)?,
            Some(SettingId::MaxFrameSize) => self.set_max_frame_size(value)?,
            Some(SettingId::MaxHeaderListSize) => self.set_max_header_list_size(value),
            None => {}
        }
        Ok(())
    }

    /// Iterate present parameters in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (SettingId, u32)> + '_ {
        let entries = [
            (SettingId::HeaderTableSize, self.header_table_size),
            (
                SettingId::EnablePush,
                self.enable_push.map(|v| v as u32),
            ),
            (SettingId::MaxConcurrentStreams, self.max_concurrent_streams),
            (SettingId::InitialWindowSize, self.initial_window_size),
            (SettingId::MaxFrameSize, self.max_frame_size),
            (SettingId::MaxHeaderListSize, self.max_header_list_size),
        ];
        entries.into_iter().filter_map(|(id, v)| v.map(|v| (id, v)))
    }

    /// Overlay present values of `other` onto `self`
    pub fn merge(&mut self, other: &Settings) {
        if other.header_table_size.is_some() {
            self.header_table_size = other.header_table_size;
        }
        if other.enable_push.is_some() {
            self.enable_push = other.enable_push;
        }
        if other.max_concurrent_streams.is_some() {
            self.max_concurrent_streams = other.max_concurrent_streams;
        }
        if other.initial_window_size.is_some() {
            self.initial_window_size = other.initial_window_size;
        }
        if other.max_frame_size.is_some() {
            self.max_frame_size = other.max_frame_size;
        }
        if other.max_header_list_size.is_some() {
            self.max_header_list_size = other.max_header_list_size;
        }
    }
}

/// Builder for HTTP/2 settings
#[derive(Default)]
pub struct SettingsBuilder {
    settings: Settings,
    error: Option<Error>,
}

impl SettingsBuilder {
    /// Create a new settings builder
    pub fn new() -> Self {
        SettingsBuilder::default()
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings.set_header_table_size(size);
        self
    }

    /// Set enable push
    pub fn enable_push(mut self, enable: bool) -> Self {
        self.settings.set_enable_push(enable);
        self
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings.set_max_concurrent_streams(max);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        if let Err(e) = self.settings.set_initial_window_size(size) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        if let Err(e) = self.settings.set_max_frame_size(size) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Set max header list size
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings.set_max_header_list_size(size);
        self
    }

    /// Build the settings, surfacing the first assignment error
    pub fn build(self) -> Result<Settings> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_id_conversion() {
        assert_eq!(SettingId::HeaderTableSize.as_u16(), 0x1);
        assert_eq!(SettingId::MaxHeaderListSize.as_u16(), 0x6);
        assert_eq!(SettingId::from_u16(0x4), Some(SettingId::InitialWindowSize));
        assert_eq!(SettingId::from_u16(0x7), None);
    }

    #[test]
    fn test_rejects_at_assignment() {
        let mut settings = Settings::new();
        assert!(settings.set_initial_window_size(0x8000_0000).is_err());
        assert!(settings.set_max_frame_size(1024).is_err());
        assert!(settings.set_max_frame_size(16_777_216).is_err());
        // Nothing was assigned
        assert!(settings.is_empty());

        assert!(settings.set_max_frame_size(16_384).is_ok());
        assert_eq!(settings.max_frame_size(), Some(16_384));
    }

    #[test]
    fn test_apply_raw_ignores_unknown() {
        let mut settings = Settings::new();
        settings.apply_raw(0x99, 7).unwrap();
        assert!(settings.is_empty());

        settings.apply_raw(0x2, 1).unwrap();
        assert_eq!(settings.enable_push(), Some(true));
        assert!(settings.apply_raw(0x2, 2).is_err());
    }

    #[test]
    fn test_iter_order() {
        let settings = SettingsBuilder::new()
            .max_frame_size(16_384)
            .header_table_size(8192)
            .build()
            .unwrap();

        let entries: Vec<_> = settings.iter().collect();
        assert_eq!(
            entries,
            vec![
                (SettingId::HeaderTableSize, 8192),
                (SettingId::MaxFrameSize, 16_384)
            ]
        );
        assert_eq!(settings.len(), 2);
    }

    #[test]
    fn test_builder_surfaces_error() {
        let result = SettingsBuilder::new()
            .initial_window_size(0x8000_0000)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_merge() {
        let mut base = SettingsBuilder::new()
            .header_table_size(4096)
            .enable_push(true)
            .build()
            .unwrap();
        let overlay = SettingsBuilder::new()
            .header_table_size(8192)
            .max_concurrent_streams(100)
            .build()
            .unwrap();

        base.merge(&overlay);
        assert_eq!(base.header_table_size(), Some(8192));
        assert_eq!(base.enable_push(), Some(true));
        assert_eq!(base.max_concurrent_streams(), Some(100));
    }
}
