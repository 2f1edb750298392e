use binrw::binrw;
use bitfield_struct::bitfield;

/// Bag key carrying the accepted formats of an `attr` entry.
pub const ATTR_TYPE: u32 = 0x0100_0000;
pub const ATTR_MIN: u32 = 0x0100_0001;
pub const ATTR_MAX: u32 = 0x0100_0002;
pub const ATTR_L10N: u32 = 0x0100_0003;

/// Bag keys of a `plurals` entry, in declaration order of the quantities.
pub const PLURAL_KEYS: [(&str, u32); 6] = [
    ("other", 0x0100_0004),
    ("zero", 0x0100_0005),
    ("one", 0x0100_0006),
    ("two", 0x0100_0007),
    ("few", 0x0100_0008),
    ("many", 0x0100_0009),
];

/// Bag key of the `index`-th item of an array.
pub fn array_key(index: usize) -> u32 {
    0x0200_0000 | index as u32
}

pub fn plural_key(quantity: &str) -> Option<u32> {
    PLURAL_KEYS
        .iter()
        .find(|(name, _)| *name == quantity)
        .map(|(_, key)| *key)
}

pub fn plural_quantity(key: u32) -> Option<&'static str> {
    PLURAL_KEYS
        .iter()
        .find(|(_, k)| *k == key)
        .map(|(name, _)| *name)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Reference,
    Attribute,
    String,
    Float,
    Dimension,
    Fraction,
    DynamicReference,
    DynamicAttribute,
    IntDec,
    IntHex,
    IntBoolean,
    ColorArgb8,
    ColorRgb8,
    ColorArgb4,
    ColorRgb4,
    Other(u8),
}

impl From<u8> for ValueType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ValueType::Null,
            0x01 => ValueType::Reference,
            0x02 => ValueType::Attribute,
            0x03 => ValueType::String,
            0x04 => ValueType::Float,
            0x05 => ValueType::Dimension,
            0x06 => ValueType::Fraction,
            0x07 => ValueType::DynamicReference,
            0x08 => ValueType::DynamicAttribute,
            0x10 => ValueType::IntDec,
            0x11 => ValueType::IntHex,
            0x12 => ValueType::IntBoolean,
            0x1c => ValueType::ColorArgb8,
            0x1d => ValueType::ColorRgb8,
            0x1e => ValueType::ColorArgb4,
            0x1f => ValueType::ColorRgb4,
            other => ValueType::Other(other),
        }
    }
}

impl From<ValueType> for u8 {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::Null => 0x00,
            ValueType::Reference => 0x01,
            ValueType::Attribute => 0x02,
            ValueType::String => 0x03,
            ValueType::Float => 0x04,
            ValueType::Dimension => 0x05,
            ValueType::Fraction => 0x06,
            ValueType::DynamicReference => 0x07,
            ValueType::DynamicAttribute => 0x08,
            ValueType::IntDec => 0x10,
            ValueType::IntHex => 0x11,
            ValueType::IntBoolean => 0x12,
            ValueType::ColorArgb8 => 0x1c,
            ValueType::ColorRgb8 => 0x1d,
            ValueType::ColorArgb4 => 0x1e,
            ValueType::ColorRgb4 => 0x1f,
            ValueType::Other(other) => other,
        }
    }
}

impl ValueType {
    pub fn is_color(&self) -> bool {
        matches!(
            self,
            ValueType::ColorArgb8 | ValueType::ColorRgb8 | ValueType::ColorArgb4 | ValueType::ColorRgb4
        )
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, ValueType::Reference | ValueType::DynamicReference)
    }
}

/// A typed 32-bit value as stored in table entries and binary XML attributes.
#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResValue {
    #[br(temp)]
    #[bw(calc = 8u16)]
    size: u16,

    #[br(temp)]
    #[bw(calc = 0u8)]
    res0: u8,

    #[br(map = |raw: u8| ValueType::from(raw))]
    #[bw(map = |t: &ValueType| u8::from(*t))]
    pub data_type: ValueType,

    pub data: u32,
}

impl ResValue {
    pub const SIZE: u32 = 8;

    pub fn new(data_type: ValueType, data: u32) -> Self {
        Self { data_type, data }
    }

    /// The "undefined" value new entries start out with.
    pub fn null() -> Self {
        Self::new(ValueType::Null, 0)
    }

    pub fn string(index: u32) -> Self {
        Self::new(ValueType::String, index)
    }

    pub fn reference(id: u32) -> Self {
        Self::new(ValueType::Reference, id)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ValueType::IntBoolean, if value { 0xffff_ffff } else { 0 })
    }

    pub fn int(value: i32) -> Self {
        Self::new(ValueType::IntDec, value as u32)
    }
}

#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct EntryFlags {
    pub complex: bool,
    pub public: bool,
    pub weak: bool,
    pub compact: bool,
    #[bits(12)]
    __: u16,
}

/// Formats accepted by an `attr` resource, stored under [ATTR_TYPE].
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct AttrFormat {
    pub reference: bool,
    pub string: bool,
    pub integer: bool,
    pub boolean: bool,
    pub color: bool,
    pub float: bool,
    pub dimension: bool,
    pub fraction: bool,
    #[bits(8)]
    __reserved: u8,
    pub enumeration: bool,
    pub flags: bool,
    #[bits(14)]
    __tail: u16,
}

impl AttrFormat {
    /// The format of an attribute that accepts any scalar value.
    pub fn any() -> Self {
        Self::from_bits(0xffff)
    }

    /// Parses the `format` attribute of an `<attr>` declaration (`color|reference`).
    pub fn parse(formats: &str) -> Option<Self> {
        let mut format = AttrFormat::new();
        for part in formats.split('|').map(str::trim) {
            format = match part {
                "reference" => format.with_reference(true),
                "string" => format.with_string(true),
                "integer" => format.with_integer(true),
                "boolean" => format.with_boolean(true),
                "color" => format.with_color(true),
                "float" => format.with_float(true),
                "dimension" => format.with_dimension(true),
                "fraction" => format.with_fraction(true),
                "enum" => format.with_enumeration(true),
                "flags" => format.with_flags(true),
                _ => return None,
            };
        }
        Some(format)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = vec![];
        if self.reference() {
            names.push("reference");
        }
        if self.string() {
            names.push("string");
        }
        if self.integer() {
            names.push("integer");
        }
        if self.boolean() {
            names.push("boolean");
        }
        if self.color() {
            names.push("color");
        }
        if self.float() {
            names.push("float");
        }
        if self.dimension() {
            names.push("dimension");
        }
        if self.fraction() {
            names.push("fraction");
        }
        if self.enumeration() {
            names.push("enum");
        }
        if self.flags() {
            names.push("flags");
        }
        names
    }
}
