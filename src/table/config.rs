//! Device configuration a table block applies to, and its textual qualifier form
//! (`en-rUS`, `sw600dp-land`, `night-v8`, ...).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use itertools::Itertools;
use lazy_regex::{regex_captures, regex_is_match};
use std::fmt;
use std::io::{Cursor, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown configuration qualifier \"{0}\" in \"{1}\"")]
    UnknownQualifier(String, String),

    #[error("Configuration of {0} bytes is too small")]
    TooSmall(u32),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

const SIZE_MASK: u8 = 0x0f;
const LONG_MASK: u8 = 0x30;
const LAYOUTDIR_MASK: u8 = 0xc0;
const ROUND_MASK: u8 = 0x03;
const WIDE_GAMUT_MASK: u8 = 0x03;
const HDR_MASK: u8 = 0x0c;
const UI_TYPE_MASK: u8 = 0x0f;
const UI_NIGHT_MASK: u8 = 0x30;
const KEYSHIDDEN_MASK: u8 = 0x03;
const NAVHIDDEN_MASK: u8 = 0x0c;

pub const DENSITY_ANY: u16 = 0xfffe;
pub const DENSITY_NONE: u16 = 0xffff;

const DENSITIES: [(&str, u16); 9] = [
    ("ldpi", 120),
    ("mdpi", 160),
    ("tvdpi", 213),
    ("hdpi", 240),
    ("xhdpi", 320),
    ("xxhdpi", 480),
    ("xxxhdpi", 640),
    ("anydpi", DENSITY_ANY),
    ("nodpi", DENSITY_NONE),
];

const UI_TYPES: [(&str, u8); 6] = [
    ("desk", 2),
    ("car", 3),
    ("television", 4),
    ("appliance", 5),
    ("watch", 6),
    ("vrheadset", 7),
];

const SCREEN_SIZES: [(&str, u8); 4] = [("small", 1), ("normal", 2), ("large", 3), ("xlarge", 4)];
const ORIENTATIONS: [(&str, u8); 3] = [("port", 1), ("land", 2), ("square", 3)];
const TOUCHSCREENS: [(&str, u8); 3] = [("notouch", 1), ("stylus", 2), ("finger", 3)];
const KEYBOARDS: [(&str, u8); 3] = [("nokeys", 1), ("qwerty", 2), ("12key", 3)];
const NAVIGATIONS: [(&str, u8); 4] = [("nonav", 1), ("dpad", 2), ("trackball", 3), ("wheel", 4)];
const KEYS_HIDDEN: [(&str, u8); 3] = [("keysexposed", 1), ("keyshidden", 2), ("keyssoft", 3)];

/// Number of bytes of the configuration layout that are understood, size field included.
const KNOWN_SIZE: usize = 52;
/// Size written for newly created configurations.
const DEFAULT_SIZE: u32 = 64;

fn lookup<T: Copy + PartialEq>(table: &[(&'static str, T)], name: &str) -> Option<T> {
    table.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

fn name_of<T: Copy + PartialEq>(table: &[(&'static str, T)], value: T) -> Option<&'static str> {
    table.iter().find(|(_, v)| *v == value).map(|(n, _)| *n)
}

#[derive(Clone, Debug, Default)]
pub struct ResConfig {
    pub mcc: u16,
    pub mnc: u16,
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
    pub keyboard: u8,
    pub navigation: u8,
    pub input_flags: u8,
    pub input_pad0: u8,
    pub screen_width: u16,
    pub screen_height: u16,
    pub sdk_version: u16,
    pub minor_version: u16,
    pub screen_layout: u8,
    pub ui_mode: u8,
    pub smallest_screen_width_dp: u16,
    pub screen_width_dp: u16,
    pub screen_height_dp: u16,
    pub locale_script: [u8; 4],
    pub locale_variant: [u8; 8],
    pub screen_layout2: u8,
    pub color_mode: u8,
    pub screen_config_pad2: u16,
    trailing: Vec<u8>,
}

impl PartialEq for ResConfig {
    fn eq(&self, other: &Self) -> bool {
        fn trimmed(bytes: &[u8]) -> &[u8] {
            let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
            &bytes[..end]
        }
        self.fields() == other.fields() && trimmed(&self.trailing) == trimmed(&other.trailing)
    }
}

impl Eq for ResConfig {}

impl ResConfig {
    fn fields(&self) -> [u64; 6] {
        let script = u32::from_le_bytes(self.locale_script) as u64;
        let variant = u64::from_le_bytes(self.locale_variant);
        [
            (self.mcc as u64) << 48
                | (self.mnc as u64) << 32
                | (u16::from_le_bytes(self.language) as u64) << 16
                | u16::from_le_bytes(self.country) as u64,
            (self.orientation as u64) << 56
                | (self.touchscreen as u64) << 48
                | (self.density as u64) << 32
                | (self.keyboard as u64) << 24
                | (self.navigation as u64) << 16
                | (self.input_flags as u64) << 8
                | self.input_pad0 as u64,
            (self.screen_width as u64) << 48
                | (self.screen_height as u64) << 32
                | (self.sdk_version as u64) << 16
                | self.minor_version as u64,
            (self.screen_layout as u64) << 56
                | (self.ui_mode as u64) << 48
                | (self.smallest_screen_width_dp as u64) << 32
                | (self.screen_width_dp as u64) << 16
                | self.screen_height_dp as u64,
            script << 32
                | (self.screen_layout2 as u64) << 24
                | (self.color_mode as u64) << 16
                | self.screen_config_pad2 as u64,
            variant,
        ]
    }

    pub fn is_default(&self) -> bool {
        *self == ResConfig::default()
    }

    /// Reads a size-prefixed configuration. Bytes beyond the understood layout are kept
    /// so the configuration is written back unchanged.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ConfigError> {
        let size = reader.read_u32::<LittleEndian>()?;
        if size < 28 {
            return Err(ConfigError::TooSmall(size));
        }
        let mut raw = vec![0u8; size as usize - 4];
        reader.read_exact(&mut raw)?;

        let mut known = [0u8; KNOWN_SIZE - 4];
        let copied = raw.len().min(known.len());
        known[..copied].copy_from_slice(&raw[..copied]);
        let trailing = raw.get(known.len()..).map(<[u8]>::to_vec).unwrap_or_default();

        let mut c = Cursor::new(&known[..]);
        let mut config = ResConfig {
            mcc: c.read_u16::<LittleEndian>()?,
            mnc: c.read_u16::<LittleEndian>()?,
            ..Default::default()
        };
        c.read_exact(&mut config.language)?;
        c.read_exact(&mut config.country)?;
        config.orientation = c.read_u8()?;
        config.touchscreen = c.read_u8()?;
        config.density = c.read_u16::<LittleEndian>()?;
        config.keyboard = c.read_u8()?;
        config.navigation = c.read_u8()?;
        config.input_flags = c.read_u8()?;
        config.input_pad0 = c.read_u8()?;
        config.screen_width = c.read_u16::<LittleEndian>()?;
        config.screen_height = c.read_u16::<LittleEndian>()?;
        config.sdk_version = c.read_u16::<LittleEndian>()?;
        config.minor_version = c.read_u16::<LittleEndian>()?;
        config.screen_layout = c.read_u8()?;
        config.ui_mode = c.read_u8()?;
        config.smallest_screen_width_dp = c.read_u16::<LittleEndian>()?;
        config.screen_width_dp = c.read_u16::<LittleEndian>()?;
        config.screen_height_dp = c.read_u16::<LittleEndian>()?;
        c.read_exact(&mut config.locale_script)?;
        c.read_exact(&mut config.locale_variant)?;
        config.screen_layout2 = c.read_u8()?;
        config.color_mode = c.read_u8()?;
        config.screen_config_pad2 = c.read_u16::<LittleEndian>()?;
        config.trailing = trailing;
        Ok(config)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), ConfigError> {
        let trailing = if self.trailing.is_empty() {
            vec![0u8; DEFAULT_SIZE as usize - KNOWN_SIZE]
        } else {
            self.trailing.clone()
        };
        writer.write_u32::<LittleEndian>((KNOWN_SIZE + trailing.len()) as u32)?;
        writer.write_u16::<LittleEndian>(self.mcc)?;
        writer.write_u16::<LittleEndian>(self.mnc)?;
        writer.write_all(&self.language)?;
        writer.write_all(&self.country)?;
        writer.write_u8(self.orientation)?;
        writer.write_u8(self.touchscreen)?;
        writer.write_u16::<LittleEndian>(self.density)?;
        writer.write_u8(self.keyboard)?;
        writer.write_u8(self.navigation)?;
        writer.write_u8(self.input_flags)?;
        writer.write_u8(self.input_pad0)?;
        writer.write_u16::<LittleEndian>(self.screen_width)?;
        writer.write_u16::<LittleEndian>(self.screen_height)?;
        writer.write_u16::<LittleEndian>(self.sdk_version)?;
        writer.write_u16::<LittleEndian>(self.minor_version)?;
        writer.write_u8(self.screen_layout)?;
        writer.write_u8(self.ui_mode)?;
        writer.write_u16::<LittleEndian>(self.smallest_screen_width_dp)?;
        writer.write_u16::<LittleEndian>(self.screen_width_dp)?;
        writer.write_u16::<LittleEndian>(self.screen_height_dp)?;
        writer.write_all(&self.locale_script)?;
        writer.write_all(&self.locale_variant)?;
        writer.write_u8(self.screen_layout2)?;
        writer.write_u8(self.color_mode)?;
        writer.write_u16::<LittleEndian>(self.screen_config_pad2)?;
        writer.write_all(&trailing)?;
        Ok(())
    }

    /// Parses a dash separated qualifier string. The empty string is the default configuration.
    pub fn parse(qualifiers: &str) -> Result<Self, ConfigError> {
        let mut config = ResConfig::default();
        let qualifiers = qualifiers.trim_start_matches('-');
        if qualifiers.is_empty() {
            return Ok(config);
        }

        let unknown = |part: &str| ConfigError::UnknownQualifier(part.to_string(), qualifiers.to_string());

        for part in qualifiers.split('-') {
            let lower = part.to_ascii_lowercase();
            let lower = lower.as_str();

            if let Some((_, mcc)) = regex_captures!(r"^mcc(\d{1,3})$", lower) {
                config.mcc = mcc.parse().map_err(|_| unknown(part))?;
            } else if let Some((_, mnc)) = regex_captures!(r"^mnc(\d{1,3})$", lower) {
                config.mnc = match mnc.parse::<u16>().map_err(|_| unknown(part))? {
                    0 => 0xffff,
                    mnc => mnc,
                };
            } else if lower == "ldltr" || lower == "ldrtl" {
                let dir = if lower == "ldltr" { 0x40 } else { 0x80 };
                config.screen_layout = (config.screen_layout & !LAYOUTDIR_MASK) | dir;
            } else if let Some((_, dp)) = regex_captures!(r"^sw(\d+)dp$", lower) {
                config.smallest_screen_width_dp = dp.parse().map_err(|_| unknown(part))?;
            } else if let Some((_, dp)) = regex_captures!(r"^w(\d+)dp$", lower) {
                config.screen_width_dp = dp.parse().map_err(|_| unknown(part))?;
            } else if let Some((_, dp)) = regex_captures!(r"^h(\d+)dp$", lower) {
                config.screen_height_dp = dp.parse().map_err(|_| unknown(part))?;
            } else if let Some(size) = lookup(&SCREEN_SIZES, lower) {
                config.screen_layout = (config.screen_layout & !SIZE_MASK) | size;
            } else if lower == "long" || lower == "notlong" {
                let long = if lower == "long" { 0x20 } else { 0x10 };
                config.screen_layout = (config.screen_layout & !LONG_MASK) | long;
            } else if lower == "round" || lower == "notround" {
                let round = if lower == "round" { 0x02 } else { 0x01 };
                config.screen_layout2 = (config.screen_layout2 & !ROUND_MASK) | round;
            } else if lower == "widecg" || lower == "nowidecg" {
                let wide = if lower == "widecg" { 0x02 } else { 0x01 };
                config.color_mode = (config.color_mode & !WIDE_GAMUT_MASK) | wide;
            } else if lower == "highdr" || lower == "lowdr" {
                let hdr = if lower == "highdr" { 0x08 } else { 0x04 };
                config.color_mode = (config.color_mode & !HDR_MASK) | hdr;
            } else if let Some(orientation) = lookup(&ORIENTATIONS, lower) {
                config.orientation = orientation;
            } else if let Some(ui_type) = lookup(&UI_TYPES, lower) {
                config.ui_mode = (config.ui_mode & !UI_TYPE_MASK) | ui_type;
            } else if lower == "night" || lower == "notnight" {
                let night = if lower == "night" { 0x20 } else { 0x10 };
                config.ui_mode = (config.ui_mode & !UI_NIGHT_MASK) | night;
            } else if let Some(density) = lookup(&DENSITIES, lower) {
                config.density = density;
            } else if let Some((_, dpi)) = regex_captures!(r"^(\d+)dpi$", lower) {
                config.density = dpi.parse().map_err(|_| unknown(part))?;
            } else if let Some(touch) = lookup(&TOUCHSCREENS, lower) {
                config.touchscreen = touch;
            } else if let Some(keys) = lookup(&KEYS_HIDDEN, lower) {
                config.input_flags = (config.input_flags & !KEYSHIDDEN_MASK) | keys;
            } else if let Some(keyboard) = lookup(&KEYBOARDS, lower) {
                config.keyboard = keyboard;
            } else if lower == "navexposed" || lower == "navhidden" {
                let nav = if lower == "navhidden" { 0x08 } else { 0x04 };
                config.input_flags = (config.input_flags & !NAVHIDDEN_MASK) | nav;
            } else if let Some(nav) = lookup(&NAVIGATIONS, lower) {
                config.navigation = nav;
            } else if let Some((_, w, h)) = regex_captures!(r"^(\d+)x(\d+)$", lower) {
                config.screen_width = w.parse().map_err(|_| unknown(part))?;
                config.screen_height = h.parse().map_err(|_| unknown(part))?;
            } else if let Some((_, v)) = regex_captures!(r"^v(\d+)$", lower) {
                config.sdk_version = v.parse().map_err(|_| unknown(part))?;
            } else if let Some(tag) = part.strip_prefix("b+") {
                config.apply_bcp47(tag).ok_or_else(|| unknown(part))?;
            } else if config.language == [0, 0] && regex_is_match!(r"^[a-z]{2,3}$", lower) {
                config.language = pack_code(lower.as_bytes(), b'a');
            } else if config.language != [0, 0] && config.country == [0, 0] {
                if let Some((_, region)) = regex_captures!(r"^r([a-zA-Z]{2}|\d{3})$", part) {
                    config.country = pack_code(region.to_ascii_uppercase().as_bytes(), b'0');
                } else {
                    return Err(unknown(part));
                }
            } else {
                return Err(unknown(part));
            }
        }

        Ok(config)
    }

    fn apply_bcp47(&mut self, tag: &str) -> Option<()> {
        let mut parts = tag.split('+');
        let language = parts.next()?.to_ascii_lowercase();
        if !(2..=3).contains(&language.len()) {
            return None;
        }
        self.language = pack_code(language.as_bytes(), b'a');
        for part in parts {
            match part.len() {
                4 if part.chars().all(|c| c.is_ascii_alphabetic()) => {
                    self.locale_script.copy_from_slice(part.as_bytes());
                }
                2 | 3 if self.country == [0, 0] => {
                    self.country = pack_code(part.to_ascii_uppercase().as_bytes(), b'0');
                }
                5..=8 => {
                    self.locale_variant = [0; 8];
                    self.locale_variant[..part.len()].copy_from_slice(part.as_bytes());
                }
                _ => return None,
            }
        }
        Some(())
    }

    pub fn language(&self) -> Option<String> {
        unpack_code(self.language, b'a')
    }

    pub fn region(&self) -> Option<String> {
        unpack_code(self.country, b'0')
    }

    fn locale_qualifier(&self) -> Option<String> {
        let language = self.language()?;
        let script = String::from_utf8_lossy(&self.locale_script)
            .trim_end_matches('\0')
            .to_string();
        let variant = String::from_utf8_lossy(&self.locale_variant)
            .trim_end_matches('\0')
            .to_string();

        if script.is_empty() && variant.is_empty() {
            return Some(match self.region() {
                Some(region) => format!("{language}-r{region}"),
                None => language,
            });
        }

        let mut tag = format!("b+{language}");
        if !script.is_empty() {
            tag.push('+');
            tag.push_str(&script);
        }
        if let Some(region) = self.region() {
            tag.push('+');
            tag.push_str(&region);
        }
        if !variant.is_empty() {
            tag.push('+');
            tag.push_str(&variant);
        }
        Some(tag)
    }

    /// The qualifier parts in the order aapt expects them.
    pub fn qualifiers(&self) -> Vec<String> {
        let mut parts = vec![];
        if self.mcc != 0 {
            parts.push(format!("mcc{}", self.mcc));
        }
        if self.mnc != 0 {
            parts.push(match self.mnc {
                0xffff => "mnc00".to_string(),
                mnc => format!("mnc{mnc}"),
            });
        }
        if let Some(locale) = self.locale_qualifier() {
            parts.push(locale);
        }
        match self.screen_layout & LAYOUTDIR_MASK {
            0x40 => parts.push("ldltr".to_string()),
            0x80 => parts.push("ldrtl".to_string()),
            _ => {}
        }
        if self.smallest_screen_width_dp != 0 {
            parts.push(format!("sw{}dp", self.smallest_screen_width_dp));
        }
        if self.screen_width_dp != 0 {
            parts.push(format!("w{}dp", self.screen_width_dp));
        }
        if self.screen_height_dp != 0 {
            parts.push(format!("h{}dp", self.screen_height_dp));
        }
        if let Some(size) = name_of(&SCREEN_SIZES, self.screen_layout & SIZE_MASK) {
            parts.push(size.to_string());
        }
        match self.screen_layout & LONG_MASK {
            0x10 => parts.push("notlong".to_string()),
            0x20 => parts.push("long".to_string()),
            _ => {}
        }
        match self.screen_layout2 & ROUND_MASK {
            0x01 => parts.push("notround".to_string()),
            0x02 => parts.push("round".to_string()),
            _ => {}
        }
        match self.color_mode & WIDE_GAMUT_MASK {
            0x01 => parts.push("nowidecg".to_string()),
            0x02 => parts.push("widecg".to_string()),
            _ => {}
        }
        match self.color_mode & HDR_MASK {
            0x04 => parts.push("lowdr".to_string()),
            0x08 => parts.push("highdr".to_string()),
            _ => {}
        }
        if let Some(orientation) = name_of(&ORIENTATIONS, self.orientation) {
            parts.push(orientation.to_string());
        }
        if let Some(ui_type) = name_of(&UI_TYPES, self.ui_mode & UI_TYPE_MASK) {
            parts.push(ui_type.to_string());
        }
        match self.ui_mode & UI_NIGHT_MASK {
            0x10 => parts.push("notnight".to_string()),
            0x20 => parts.push("night".to_string()),
            _ => {}
        }
        if self.density != 0 {
            parts.push(match name_of(&DENSITIES, self.density) {
                Some(name) => name.to_string(),
                None => format!("{}dpi", self.density),
            });
        }
        if let Some(touch) = name_of(&TOUCHSCREENS, self.touchscreen) {
            parts.push(touch.to_string());
        }
        if let Some(keys) = name_of(&KEYS_HIDDEN, self.input_flags & KEYSHIDDEN_MASK) {
            parts.push(keys.to_string());
        }
        if let Some(keyboard) = name_of(&KEYBOARDS, self.keyboard) {
            parts.push(keyboard.to_string());
        }
        match self.input_flags & NAVHIDDEN_MASK {
            0x04 => parts.push("navexposed".to_string()),
            0x08 => parts.push("navhidden".to_string()),
            _ => {}
        }
        if let Some(nav) = name_of(&NAVIGATIONS, self.navigation) {
            parts.push(nav.to_string());
        }
        if self.screen_width != 0 || self.screen_height != 0 {
            parts.push(format!("{}x{}", self.screen_width, self.screen_height));
        }
        if self.sdk_version != 0 {
            parts.push(format!("v{}", self.sdk_version));
        }
        parts
    }

    /// True when density is the only qualifier set, as in density split names.
    pub fn is_density_only(&self) -> bool {
        self.density != 0
            && ResConfig {
                density: 0,
                ..self.clone()
            }
            .is_default()
    }
}

impl fmt::Display for ResConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualifiers().iter().join("-"))
    }
}

/// Packs a two or three letter language or region code the way the table stores it.
fn pack_code(code: &[u8], base: u8) -> [u8; 2] {
    match code {
        [a, b] => [*a, *b],
        [a, b, c] => {
            let first = a.wrapping_sub(base) & 0x7f;
            let second = b.wrapping_sub(base) & 0x7f;
            let third = c.wrapping_sub(base) & 0x7f;
            [0x80 | (third << 2) | (second >> 3), (second << 5) | first]
        }
        _ => [0, 0],
    }
}

fn unpack_code(packed: [u8; 2], base: u8) -> Option<String> {
    if packed == [0, 0] {
        return None;
    }
    if packed[0] & 0x80 != 0 {
        let first = packed[1] & 0x1f;
        let second = ((packed[1] & 0xe0) >> 5) | ((packed[0] & 0x03) << 3);
        let third = (packed[0] & 0x7c) >> 2;
        Some(
            [first + base, second + base, third + base]
                .iter()
                .map(|b| *b as char)
                .collect(),
        )
    } else {
        Some(packed.iter().map(|b| *b as char).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(qualifiers: &str) {
        let config = ResConfig::parse(qualifiers).unwrap();
        assert_eq!(config.to_string(), qualifiers, "qualifier string changed");

        let mut bytes = vec![];
        config.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), DEFAULT_SIZE as usize);
        let read = ResConfig::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(read, config, "binary form changed");
    }

    #[test]
    fn test_default_config() {
        let config = ResConfig::parse("").unwrap();
        assert!(config.is_default());
        assert_eq!(config.to_string(), "");
    }

    #[test]
    fn test_common_qualifiers() {
        round_trip("hdpi");
        round_trip("en-rUS");
        round_trip("fil");
        round_trip("b+sr+Latn");
        round_trip("sw600dp-land");
        round_trip("night-v8");
        round_trip("ldrtl-xxhdpi-v17");
        round_trip("mcc310-mnc260-en");
        round_trip("w820dp-h480dp-large-long-round-widecg-highdr-port-car-notnight");
        round_trip("420dpi-finger-keyshidden-qwerty-navexposed-dpad-800x480-v21");
        round_trip("anydpi-v26");
    }

    #[test]
    fn test_density_values() {
        assert_eq!(ResConfig::parse("xhdpi").unwrap().density, 320);
        assert_eq!(ResConfig::parse("nodpi").unwrap().density, DENSITY_NONE);
        assert!(ResConfig::parse("xxhdpi").unwrap().is_density_only());
        assert!(!ResConfig::parse("xxhdpi-v21").unwrap().is_density_only());
    }

    #[test]
    fn test_unknown_qualifier() {
        assert!(ResConfig::parse("hdpi-bogus-thing").is_err());
    }

    #[test]
    fn test_trailing_bytes_are_ignored_when_zero() {
        let config = ResConfig::parse("de").unwrap();
        let mut bytes = vec![];
        config.write(&mut bytes).unwrap();
        bytes[0] = KNOWN_SIZE as u8;
        bytes.truncate(KNOWN_SIZE);
        let read = ResConfig::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(read, config);
    }
}
