//! Conversion between the textual values found in XML documents and typed [ResValue]s.

use lazy_regex::{regex_captures, regex_is_match};
use std::fmt;
use thiserror::Error;

use crate::resource::entry_store::{AttrDefinition, ResourceLookup};
use crate::resource::ResourceError;
use crate::table::res_value::{AttrFormat, ResValue, ValueType};
use crate::table::resource_id::ResourceId;
use crate::table::string_pool::StringPool;
use crate::xml::axml::EncodedValue;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("{value:?} is not a valid {expected}")]
    InvalidValue { value: String, expected: String },
}

impl ValueError {
    fn invalid(value: &str, expected: &str) -> Self {
        ValueError::InvalidValue {
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }
}

const DIMENSION_UNITS: [(&str, u32); 7] = [
    ("px", 0),
    ("dip", 1),
    ("dp", 1),
    ("sp", 2),
    ("pt", 3),
    ("in", 4),
    ("mm", 5),
];
const DIMENSION_NAMES: [&str; 6] = ["px", "dp", "sp", "pt", "in", "mm"];

const FRACTION_UNITS: [(&str, u32); 2] = [("%p", 1), ("%", 0)];

const COMPLEX_UNIT_MASK: u32 = 0xf;
const COMPLEX_RADIX_SHIFT: u32 = 4;
const COMPLEX_MANTISSA_SHIFT: u32 = 8;
const COMPLEX_MANTISSA_MASK: u64 = 0xff_ffff;
const RADIX_MULTIPLIERS: [f64; 4] = [
    1.0 / 256.0,
    1.0 / 32768.0,
    1.0 / 8_388_608.0,
    1.0 / 2_147_483_648.0,
];

/// A parsed `@[+][package:]type/name` or `?[package:][type/]name` reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reference<'r> {
    /// `?` references point at a theme attribute.
    pub attribute: bool,
    /// `@+` references create the entry when it does not exist.
    pub create: bool,
    pub package: Option<&'r str>,
    pub type_name: Option<&'r str>,
    pub name: &'r str,
}

impl<'r> Reference<'r> {
    pub fn parse(text: &'r str) -> Option<Self> {
        let (_, sigil, create, package, type_name, name) =
            regex_captures!(r"^([@?])(\+)?(?:([\w.]+):)?(?:([\w-]+)/)?([\w.$-]+)$", text)?;
        let reference = Self {
            attribute: sigil == "?",
            create: !create.is_empty(),
            package: Some(package).filter(|package| !package.is_empty()),
            type_name: Some(type_name).filter(|type_name| !type_name.is_empty()),
            name,
        };
        (reference.attribute || reference.type_name.is_some()).then_some(reference)
    }

    /// The referenced type; theme attribute references default to `attr`.
    pub fn resource_type(&self) -> &'r str {
        match self.type_name {
            Some(type_name) => type_name,
            None => "attr",
        }
    }

    pub fn is_framework(&self) -> bool {
        self.package == Some("android")
    }

    fn value_type(&self) -> ValueType {
        match self.attribute {
            true => ValueType::Attribute,
            false => ValueType::Reference,
        }
    }
}

impl fmt::Display for Reference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.attribute { "?" } else { "@" })?;
        if self.create {
            f.write_str("+")?;
        }
        if let Some(package) = self.package {
            write!(f, "{package}:")?;
        }
        if let Some(type_name) = self.type_name {
            write!(f, "{type_name}/")?;
        }
        f.write_str(self.name)
    }
}

/// Resolves references to ids while encoding.
pub trait ReferenceResolver {
    fn resolve_reference(&mut self, reference: &Reference<'_>) -> Result<ResourceId, ResourceError>;
}

pub fn parse_color(text: &str) -> Option<ResValue> {
    let digits = text.strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |index: usize| u32::from_str_radix(&digits[index..index + 1], 16).ok();
    let (data_type, data) = match digits.len() {
        3 => (
            ValueType::ColorRgb4,
            0xff00_0000 | nibble(0)? * 0x11 << 16 | nibble(1)? * 0x11 << 8 | nibble(2)? * 0x11,
        ),
        4 => (
            ValueType::ColorArgb4,
            nibble(0)? * 0x11 << 24 | nibble(1)? * 0x11 << 16 | nibble(2)? * 0x11 << 8 | nibble(3)? * 0x11,
        ),
        6 => (ValueType::ColorRgb8, 0xff00_0000 | u32::from_str_radix(digits, 16).ok()?),
        8 => (ValueType::ColorArgb8, u32::from_str_radix(digits, 16).ok()?),
        _ => return None,
    };
    Some(ResValue::new(data_type, data))
}

fn format_color(value: &ResValue) -> String {
    let data = value.data;
    let nibble = |shift: u32| (data >> shift) & 0xf;
    match value.data_type {
        ValueType::ColorRgb4 => format!("#{:x}{:x}{:x}", nibble(20), nibble(12), nibble(4)),
        ValueType::ColorArgb4 => format!("#{:x}{:x}{:x}{:x}", nibble(28), nibble(20), nibble(12), nibble(4)),
        ValueType::ColorRgb8 => format!("#{:06x}", data & 0x00ff_ffff),
        _ => format!("#{data:08x}"),
    }
}

pub fn parse_bool(text: &str) -> Option<ResValue> {
    match text {
        "true" => Some(ResValue::boolean(true)),
        "false" => Some(ResValue::boolean(false)),
        _ => None,
    }
}

pub fn parse_int(text: &str) -> Option<ResValue> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16)
            .ok()
            .map(|data| ResValue::new(ValueType::IntHex, data));
    }
    if !regex_is_match!(r"^[-+]?\d+$", text) {
        return None;
    }
    text.parse::<i64>()
        .ok()
        .filter(|value| *value >= i32::MIN as i64 && *value <= u32::MAX as i64)
        .map(|value| ResValue::new(ValueType::IntDec, value as u32))
}

fn parse_number(text: &str) -> Option<f64> {
    regex_is_match!(r"^[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?$", text)
        .then(|| text.parse::<f64>().ok())
        .flatten()
}

pub fn parse_float(text: &str) -> Option<ResValue> {
    let value = parse_number(text)? as f32;
    Some(ResValue::new(ValueType::Float, value.to_bits()))
}

/// Packs `value` into the 24-bit mantissa and radix of a complex value.
pub fn float_to_complex(value: f64) -> u32 {
    let negative = value < 0.0;
    let bits = (value.abs() * (1u64 << 23) as f64 + 0.5) as u64;
    let (radix, shift) = if bits & 0x7f_ffff == 0 {
        (0, 23)
    } else if bits & 0xffff_ffff_ff80_0000 == 0 {
        (3, 0)
    } else if bits & 0xffff_ffff_8000_0000 == 0 {
        (2, 8)
    } else if bits & 0xffff_ff80_0000_0000 == 0 {
        (1, 16)
    } else {
        (0, 23)
    };
    let mut mantissa = (bits >> shift) & COMPLEX_MANTISSA_MASK;
    if negative {
        mantissa = mantissa.wrapping_neg() & COMPLEX_MANTISSA_MASK;
    }
    (radix << COMPLEX_RADIX_SHIFT) | ((mantissa as u32) << COMPLEX_MANTISSA_SHIFT)
}

pub fn complex_to_float(complex: u32) -> f64 {
    let mantissa = (complex & 0xffff_ff00) as i32;
    let radix = (complex >> COMPLEX_RADIX_SHIFT) & 0x3;
    mantissa as f64 * RADIX_MULTIPLIERS[radix as usize]
}

fn split_unit(text: &str, units: &[(&str, u32)]) -> Option<(f64, u32)> {
    units.iter().find_map(|(suffix, unit)| {
        let number = text.strip_suffix(suffix)?;
        Some((parse_number(number.trim_end())?, *unit))
    })
}

pub fn parse_dimension(text: &str) -> Option<ResValue> {
    let (value, unit) = split_unit(text, &DIMENSION_UNITS)?;
    Some(ResValue::new(ValueType::Dimension, float_to_complex(value) | unit))
}

pub fn parse_fraction(text: &str) -> Option<ResValue> {
    let (value, unit) = split_unit(text, &FRACTION_UNITS)?;
    Some(ResValue::new(ValueType::Fraction, float_to_complex(value / 100.0) | unit))
}

/// Shortest decimal rendering of `value`, rounded to the precision complex values carry.
fn format_float(value: f64) -> String {
    let rounded = (value * 1e5).round() / 1e5;
    format!("{rounded}")
}

fn format_flags(value: u32, definition: &AttrDefinition) -> Option<String> {
    if let Some(symbol) = definition.symbol_name(value) {
        return Some(symbol.to_string());
    }
    let mut covered = 0;
    let mut names = vec![];
    for (name, bits) in &definition.symbols {
        if *bits != 0 && value & bits == *bits && bits & !covered != 0 {
            covered |= bits;
            names.push(name.as_str());
        }
    }
    (covered == value && !names.is_empty()).then(|| names.join("|"))
}

/// Escapes `value` for use as the text of a values XML element.
pub fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    if value.starts_with(['@', '?']) {
        escaped.push('\\');
    }
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    let needs_quotes = value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace)
        || value.contains("  ");
    match needs_quotes {
        true => format!("\"{escaped}\""),
        false => escaped,
    }
}

/// Resolves escapes and quoting in the text of a values XML element. Whitespace runs
/// outside quotes collapse to a single space.
pub fn unescape_string(text: &str) -> String {
    let mut value = String::with_capacity(text.len());
    let mut chars = text.trim().chars();
    let mut quoted = false;
    let mut pending_space = false;
    while let Some(c) = chars.next() {
        if !quoted && c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            value.push(' ');
            pending_space = false;
        }
        match c {
            '"' => quoted = !quoted,
            '\\' => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('u') => {
                    let code: String = chars.by_ref().take(4).collect();
                    match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                        Some(c) => value.push(c),
                        None => {
                            value.push_str("\\u");
                            value.push_str(&code);
                        }
                    }
                }
                Some(c) => value.push(c),
                None => value.push('\\'),
            },
            c => value.push(c),
        }
    }
    value
}

/// Renders a typed value as text. `strings` resolves string values, `definition` names enum
/// and flag values.
pub fn decode_value(
    value: &ResValue,
    strings: Option<&StringPool>,
    lookup: &dyn ResourceLookup,
    definition: Option<&AttrDefinition>,
) -> String {
    let data = value.data;
    match value.data_type {
        ValueType::Null if data == 1 => "@empty".to_string(),
        ValueType::Null => "@null".to_string(),
        ValueType::Reference | ValueType::DynamicReference if data == 0 => "@null".to_string(),
        ValueType::Reference | ValueType::DynamicReference => lookup
            .name_of(ResourceId::from(data))
            .map(|name| name.reference('@'))
            .unwrap_or_else(|| format!("@{:#010x}", data)),
        ValueType::Attribute | ValueType::DynamicAttribute => lookup
            .name_of(ResourceId::from(data))
            .map(|name| name.reference('?'))
            .unwrap_or_else(|| format!("?{:#010x}", data)),
        ValueType::String => strings
            .and_then(|strings| strings.get(data))
            .unwrap_or_default()
            .to_string(),
        ValueType::Float => {
            let text = format_float(f32::from_bits(data) as f64);
            match text.contains(['.', 'e', 'E']) || text.contains("inf") || text.contains("NaN") {
                true => text,
                false => format!("{text}.0"),
            }
        }
        ValueType::Dimension => {
            let unit = DIMENSION_NAMES
                .get((data & COMPLEX_UNIT_MASK) as usize)
                .unwrap_or(&"px");
            format!("{}{unit}", format_float(complex_to_float(data)))
        }
        ValueType::Fraction => {
            let unit = match data & COMPLEX_UNIT_MASK {
                1 => "%p",
                _ => "%",
            };
            format!("{}{unit}", format_float(complex_to_float(data) * 100.0))
        }
        ValueType::IntDec => definition
            .filter(|definition| definition.format.enumeration())
            .and_then(|definition| definition.symbol_name(data))
            .map(str::to_string)
            .unwrap_or_else(|| (data as i32).to_string()),
        ValueType::IntHex => definition
            .filter(|definition| definition.format.flags())
            .and_then(|definition| format_flags(data, definition))
            .unwrap_or_else(|| format!("{:#010x}", data)),
        ValueType::IntBoolean => (data != 0).to_string(),
        data_type if data_type.is_color() => format_color(value),
        _ => format!("{:#010x}", data),
    }
}

fn encode_symbols(text: &str, format: AttrFormat, symbols: &[(String, u32)]) -> Option<ResValue> {
    let lookup = |name: &str| {
        symbols
            .iter()
            .find(|(symbol, _)| symbol == name)
            .map(|(_, value)| *value)
    };
    if format.flags() {
        let mut data = 0;
        for part in text.split('|').map(str::trim) {
            data |= lookup(part)?;
        }
        return Some(ResValue::new(ValueType::IntHex, data));
    }
    if format.enumeration() {
        return lookup(text).map(|data| ResValue::new(ValueType::IntDec, data));
    }
    None
}

/// Encodes `text` for an attribute accepting `format`, trying references, symbols, colors,
/// booleans, integers, dimensions, fractions and floats before falling back to a string.
pub fn encode_value<R: ReferenceResolver + ?Sized>(
    text: &str,
    format: AttrFormat,
    symbols: &[(String, u32)],
    resolver: &mut R,
) -> Result<EncodedValue, ResourceError> {
    if let Some(escaped) = text.strip_prefix('\\').filter(|rest| rest.starts_with(['@', '?'])) {
        return Ok(EncodedValue::String(escaped.to_string()));
    }
    let trimmed = text.trim();
    let typed = |value: ResValue| Ok(EncodedValue::Typed(value));

    match trimmed {
        "@null" => return typed(ResValue::reference(0)),
        "@empty" => return typed(ResValue::new(ValueType::Null, 1)),
        _ => {}
    }
    if trimmed.starts_with(['@', '?']) {
        match Reference::parse(trimmed) {
            Some(reference) => {
                let id = resolver.resolve_reference(&reference)?;
                return typed(ResValue::new(reference.value_type(), id.value()));
            }
            None if format.string() => return Ok(EncodedValue::String(text.to_string())),
            None => return Err(ValueError::invalid(text, "reference").into()),
        }
    }
    if let Some(value) = encode_symbols(trimmed, format, symbols) {
        return typed(value);
    }

    let parsers: [(bool, fn(&str) -> Option<ResValue>); 6] = [
        (format.color(), parse_color),
        (format.boolean(), parse_bool),
        (format.integer(), parse_int),
        (format.dimension(), parse_dimension),
        (format.fraction(), parse_fraction),
        (format.float(), parse_float),
    ];
    if let Some(value) = parsers
        .iter()
        .filter(|(accepted, _)| *accepted)
        .find_map(|(_, parse)| parse(trimmed))
    {
        return typed(value);
    }

    if format.string() {
        return Ok(EncodedValue::String(text.to_string()));
    }
    Err(ValueError::invalid(text, &format.names().join("|")).into())
}
