//! Framework resource tables linked while encoding: the `android` package every app
//! references, plus any other shared library tables.
//!
//! A small builtin `android` table is provided for the attributes manifests and layouts
//! commonly use. Link the real framework (`framework-res.apk`) for complete coverage.

use std::path::Path;

use crate::apk::ApkError;
use crate::archive::{Archive, RESOURCE_TABLE_PATH};
use crate::table::config::ResConfig;
use crate::table::res_value::{AttrFormat, ResValue, ValueType, ATTR_TYPE};
use crate::table::resource_id::ResourceId;
use crate::table::{AllocationHint, EntryValue, Package, ResourceTable, TableError};

type Symbols = &'static [(&'static str, i64)];

const DIMENSION_SIZES: Symbols = &[("fill_parent", -1), ("match_parent", -1), ("wrap_content", -2)];
const GRAVITY: Symbols = &[
    ("top", 0x30),
    ("bottom", 0x50),
    ("left", 0x03),
    ("right", 0x05),
    ("center_vertical", 0x10),
    ("center_horizontal", 0x01),
    ("center", 0x11),
    ("start", 0x0080_0003),
    ("end", 0x0080_0005),
];

/// Framework attributes: name, id, format and enum or flag symbols.
const ATTRIBUTES: &[(&str, u32, &str, Symbols)] = &[
    ("theme", 0x0101_0000, "reference", &[]),
    ("label", 0x0101_0001, "reference|string", &[]),
    ("icon", 0x0101_0002, "reference", &[]),
    ("name", 0x0101_0003, "string", &[]),
    ("permission", 0x0101_0006, "string", &[]),
    ("protectionLevel", 0x0101_0009, "flags", &[("normal", 0), ("dangerous", 1), ("signature", 2)]),
    ("sharedUserId", 0x0101_000b, "string", &[]),
    ("persistent", 0x0101_000d, "boolean", &[]),
    ("enabled", 0x0101_000e, "boolean", &[]),
    ("debuggable", 0x0101_000f, "boolean", &[]),
    ("exported", 0x0101_0010, "boolean", &[]),
    ("process", 0x0101_0011, "string", &[]),
    ("taskAffinity", 0x0101_0012, "string", &[]),
    ("excludeFromRecents", 0x0101_0017, "boolean", &[]),
    ("authorities", 0x0101_0018, "string", &[]),
    ("grantUriPermissions", 0x0101_001b, "boolean", &[]),
    ("priority", 0x0101_001c, "integer", &[]),
    (
        "launchMode",
        0x0101_001d,
        "enum",
        &[("standard", 0), ("singleTop", 1), ("singleTask", 2), ("singleInstance", 3)],
    ),
    (
        "screenOrientation",
        0x0101_001e,
        "enum",
        &[("unspecified", -1), ("landscape", 0), ("portrait", 1), ("user", 2), ("behind", 3), ("sensor", 4), ("nosensor", 5)],
    ),
    (
        "configChanges",
        0x0101_001f,
        "flags",
        &[("keyboard", 0x10), ("keyboardHidden", 0x20), ("orientation", 0x80), ("screenLayout", 0x100), ("uiMode", 0x200), ("screenSize", 0x400), ("smallestScreenSize", 0x800), ("locale", 0x4), ("density", 0x1000)],
    ),
    ("description", 0x0101_0020, "reference|string", &[]),
    ("value", 0x0101_0024, "string|integer|boolean|color|float|dimension", &[]),
    ("resource", 0x0101_0025, "reference", &[]),
    ("mimeType", 0x0101_0026, "string", &[]),
    ("scheme", 0x0101_0027, "string", &[]),
    ("host", 0x0101_0028, "string", &[]),
    ("textAppearance", 0x0101_0034, "reference", &[]),
    ("textColorPrimary", 0x0101_0036, "reference|color", &[]),
    ("windowBackground", 0x0101_0054, "reference|color", &[]),
    ("windowNoTitle", 0x0101_0056, "boolean", &[]),
    ("textSize", 0x0101_0095, "dimension", &[]),
    ("textStyle", 0x0101_0097, "flags", &[("normal", 0), ("bold", 1), ("italic", 2)]),
    ("textColor", 0x0101_0098, "reference|color", &[]),
    ("state_focused", 0x0101_009c, "boolean", &[]),
    ("state_enabled", 0x0101_009e, "boolean", &[]),
    ("state_checked", 0x0101_00a0, "boolean", &[]),
    ("state_selected", 0x0101_00a1, "boolean", &[]),
    ("state_pressed", 0x0101_00a7, "boolean", &[]),
    (
        "ellipsize",
        0x0101_00ab,
        "enum",
        &[("none", 0), ("start", 1), ("middle", 2), ("end", 3), ("marquee", 4)],
    ),
    ("gravity", 0x0101_00af, "flags", GRAVITY),
    ("entries", 0x0101_00b2, "reference", &[]),
    ("layout_gravity", 0x0101_00b3, "flags", GRAVITY),
    ("orientation", 0x0101_00c4, "enum", &[("horizontal", 0), ("vertical", 1)]),
    ("id", 0x0101_00d0, "reference", &[]),
    ("background", 0x0101_00d4, "reference|color", &[]),
    ("padding", 0x0101_00d5, "dimension", &[]),
    ("paddingLeft", 0x0101_00d6, "dimension", &[]),
    ("paddingTop", 0x0101_00d7, "dimension", &[]),
    ("paddingRight", 0x0101_00d8, "dimension", &[]),
    ("paddingBottom", 0x0101_00d9, "dimension", &[]),
    ("focusable", 0x0101_00da, "boolean|enum", &[("auto", 0x10)]),
    ("visibility", 0x0101_00dc, "enum", &[("visible", 0), ("invisible", 1), ("gone", 2)]),
    ("clickable", 0x0101_00e5, "boolean", &[]),
    ("layout", 0x0101_00f2, "reference", &[]),
    ("layout_width", 0x0101_00f4, "dimension|enum", DIMENSION_SIZES),
    ("layout_height", 0x0101_00f5, "dimension|enum", DIMENSION_SIZES),
    ("layout_margin", 0x0101_00f6, "dimension", &[]),
    ("layout_marginLeft", 0x0101_00f7, "dimension", &[]),
    ("layout_marginTop", 0x0101_00f8, "dimension", &[]),
    ("layout_marginRight", 0x0101_00f9, "dimension", &[]),
    ("layout_marginBottom", 0x0101_00fa, "dimension", &[]),
    ("checked", 0x0101_0106, "boolean", &[]),
    ("src", 0x0101_0119, "reference|color", &[]),
    (
        "scaleType",
        0x0101_011d,
        "enum",
        &[("matrix", 0), ("fitXY", 1), ("fitStart", 2), ("fitCenter", 3), ("fitEnd", 4), ("center", 5), ("centerCrop", 6), ("centerInside", 7)],
    ),
    ("tint", 0x0101_0121, "color", &[]),
    ("max", 0x0101_0136, "integer", &[]),
    ("progress", 0x0101_0137, "integer", &[]),
    ("minWidth", 0x0101_013f, "dimension", &[]),
    ("minHeight", 0x0101_0140, "dimension", &[]),
    ("interpolator", 0x0101_0141, "reference", &[]),
    ("text", 0x0101_014f, "string", &[]),
    ("hint", 0x0101_0150, "string", &[]),
    ("maxLines", 0x0101_0153, "integer", &[]),
    ("singleLine", 0x0101_015d, "boolean", &[]),
    ("layout_weight", 0x0101_0181, "float", &[]),
    ("duration", 0x0101_0198, "integer", &[]),
    ("drawable", 0x0101_0199, "reference", &[]),
    ("color", 0x0101_01a5, "color", &[]),
    ("fromAlpha", 0x0101_01ca, "float", &[]),
    ("toAlpha", 0x0101_01cb, "float", &[]),
    ("allowTaskReparenting", 0x0101_0204, "boolean", &[]),
    ("minSdkVersion", 0x0101_020c, "integer|string", &[]),
    ("windowFullscreen", 0x0101_020d, "boolean", &[]),
    ("versionCode", 0x0101_021b, "integer", &[]),
    ("versionName", 0x0101_021c, "string", &[]),
    ("inputType", 0x0101_0220, "flags", &[("none", 0), ("text", 1), ("number", 2), ("phone", 3), ("textPassword", 0x81)]),
    ("windowSoftInputMode", 0x0101_022b, "flags", &[("stateUnspecified", 0), ("stateHidden", 2), ("adjustResize", 0x10), ("adjustPan", 0x20)]),
    ("targetSdkVersion", 0x0101_0270, "integer|string", &[]),
    ("maxSdkVersion", 0x0101_0271, "integer", &[]),
    ("testOnly", 0x0101_0272, "boolean", &[]),
    ("contentDescription", 0x0101_0273, "string", &[]),
    ("allowBackup", 0x0101_0280, "boolean", &[]),
    ("glEsVersion", 0x0101_0281, "integer", &[]),
    ("required", 0x0101_028e, "boolean", &[]),
    ("installLocation", 0x0101_02b7, "enum", &[("auto", 0), ("internalOnly", 1), ("preferExternal", 2)]),
    ("windowActionBar", 0x0101_02cd, "boolean", &[]),
    ("hardwareAccelerated", 0x0101_02d3, "boolean", &[]),
    ("alpha", 0x0101_031f, "float", &[]),
    ("largeHeap", 0x0101_035a, "boolean", &[]),
    ("parentActivityName", 0x0101_03a7, "string", &[]),
    ("fontFamily", 0x0101_03ac, "string", &[]),
    ("supportsRtl", 0x0101_03af, "boolean", &[]),
    ("banner", 0x0101_03f2, "reference", &[]),
    ("colorPrimary", 0x0101_0433, "reference|color", &[]),
    ("colorPrimaryDark", 0x0101_0434, "reference|color", &[]),
    ("colorAccent", 0x0101_0435, "reference|color", &[]),
    ("statusBarColor", 0x0101_0451, "color", &[]),
    ("navigationBarColor", 0x0101_0452, "color", &[]),
    ("extractNativeLibs", 0x0101_04ea, "boolean", &[]),
    ("fullBackupContent", 0x0101_04eb, "reference|boolean", &[]),
    ("usesCleartextTraffic", 0x0101_04ec, "boolean", &[]),
    ("resizeableActivity", 0x0101_04f6, "boolean", &[]),
    ("networkSecurityConfig", 0x0101_0527, "reference", &[]),
    ("roundIcon", 0x0101_052c, "reference", &[]),
    ("compileSdkVersion", 0x0101_0572, "integer", &[]),
    ("compileSdkVersionCodename", 0x0101_0573, "string", &[]),
    ("appComponentFactory", 0x0101_057a, "string", &[]),
    ("isSplitRequired", 0x0101_0591, "boolean", &[]),
    ("requestLegacyExternalStorage", 0x0101_0603, "boolean", &[]),
];

const IDS: &[(&str, u32)] = &[
    ("background", 0x0102_0000),
    ("content", 0x0102_0002),
    ("empty", 0x0102_0004),
    ("icon", 0x0102_0006),
    ("list", 0x0102_000a),
    ("text1", 0x0102_0014),
    ("text2", 0x0102_0015),
    ("title", 0x0102_0016),
    ("button1", 0x0102_0019),
];

/// First entry index of the ids backing enum and flag symbols.
const SYMBOL_ID_BASE: u16 = 0x0100;

const STYLES: &[(&str, u32)] = &[
    ("Theme", 0x0103_0005),
    ("Theme.Black", 0x0103_0008),
    ("Theme.Black.NoTitleBar", 0x0103_0009),
    ("Theme.NoTitleBar", 0x0103_000a),
    ("Theme.Light", 0x0103_000c),
    ("Theme.Translucent", 0x0103_000f),
];

const STRINGS: &[(&str, u32, &str)] = &[
    ("cancel", 0x0104_0000, "Cancel"),
    ("no", 0x0104_0009, "Cancel"),
    ("ok", 0x0104_000a, "OK"),
    ("yes", 0x0104_0013, "OK"),
];

const COLORS: &[(&str, u32, u32)] = &[
    ("white", 0x0106_000b, 0xffff_ffff),
    ("black", 0x0106_000c, 0xff00_0000),
    ("transparent", 0x0106_000d, 0x0000_0000),
];

fn define(
    package: &mut Package,
    type_name: &str,
    name: &str,
    id: u32,
) -> Result<ResourceId, TableError> {
    let id = ResourceId::from(id);
    package.get_or_create_with(
        &ResConfig::default(),
        type_name,
        name,
        AllocationHint {
            type_id: Some(id.type_id()),
            min_entry: id.entry(),
        },
    )
}

/// Builds the builtin `android` framework table.
pub fn builtin_android_table() -> Result<ResourceTable, TableError> {
    let mut table = ResourceTable::new(0x01, "android");
    let default = ResConfig::default();

    let mut attributes = ATTRIBUTES.to_vec();
    attributes.sort_by_key(|(_, id, _, _)| *id);
    let mut ids = IDS.to_vec();
    ids.sort_by_key(|(_, id)| *id);

    let strings: Vec<u32> = STRINGS
        .iter()
        .map(|(_, _, value)| table.strings_mut().get_or_insert(value))
        .collect();
    let package = &mut table.packages_mut()[0];

    for (name, id) in ids {
        let id = define(package, "id", name, id)?;
        package.set_entry(id, &default, EntryValue::Simple(ResValue::boolean(false)))?;
    }

    let mut symbol_index = SYMBOL_ID_BASE;
    for (name, id, format, symbols) in attributes {
        let format = AttrFormat::parse(format).unwrap_or_else(AttrFormat::any);
        let mut items = vec![(ATTR_TYPE, ResValue::new(ValueType::IntDec, format.into_bits()))];
        for (symbol, value) in symbols {
            let symbol_id = match package.find("id", symbol) {
                Some(symbol_id) => symbol_id,
                None => {
                    let symbol_id = package.get_or_create_with(
                        &default,
                        "id",
                        symbol,
                        AllocationHint {
                            type_id: Some(0x02),
                            min_entry: symbol_index,
                        },
                    )?;
                    package.set_entry(symbol_id, &default, EntryValue::Simple(ResValue::boolean(false)))?;
                    symbol_index = symbol_id.entry() + 1;
                    symbol_id
                }
            };
            let data_type = if format.flags() {
                ValueType::IntHex
            } else {
                ValueType::IntDec
            };
            items.push((symbol_id.value(), ResValue::new(data_type, *value as i32 as u32)));
        }
        let id = define(package, "attr", name, id)?;
        package.set_entry(id, &default, EntryValue::Complex { parent: 0, items })?;
    }

    for (name, id) in STYLES {
        let id = define(package, "style", name, *id)?;
        package.set_entry(id, &default, EntryValue::Complex { parent: 0, items: vec![] })?;
    }
    for ((name, id, _), string) in STRINGS.iter().zip(strings) {
        let id = define(package, "string", name, *id)?;
        package.set_entry(id, &default, EntryValue::Simple(ResValue::string(string)))?;
    }
    for (name, id, color) in COLORS {
        let id = define(package, "color", name, *id)?;
        package.set_entry(
            id,
            &default,
            EntryValue::Simple(ResValue::new(ValueType::ColorArgb8, *color)),
        )?;
    }
    Ok(table)
}

/// The framework tables linked into every encode.
#[derive(Debug, Default)]
pub struct FrameworkTables {
    tables: Vec<ResourceTable>,
}

impl FrameworkTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Result<Self, TableError> {
        Ok(Self {
            tables: vec![builtin_android_table()?],
        })
    }

    pub fn push(&mut self, table: ResourceTable) {
        self.tables.push(table);
    }

    /// Loads a framework table from a `resources.arsc` file or from an apk containing one.
    pub fn load_file(path: &Path) -> Result<ResourceTable, ApkError> {
        if path.extension().is_some_and(|extension| extension == "arsc") {
            let data = crate::utils::get_file_as_byte_vec(path)?;
            return Ok(ResourceTable::read(&data)?);
        }
        let archive = Archive::open(path)?;
        let data = archive.bytes(RESOURCE_TABLE_PATH).ok_or(ApkError::NoResourceTable)?;
        Ok(ResourceTable::read(data)?)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &ResourceTable> {
        self.tables.iter()
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.tables.iter().flat_map(|table| table.packages().iter())
    }

    /// Looks up `type_name/name`, optionally restricted to the package named `package`.
    pub fn find(&self, package: Option<&str>, type_name: &str, name: &str) -> Option<ResourceId> {
        self.packages()
            .filter(|candidate| package.map_or(true, |package| candidate.name == package))
            .find_map(|candidate| candidate.find(type_name, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::entry_store::{EntryStore, ResourceLookup};

    #[test]
    fn test_builtin_ids() -> Result<(), TableError> {
        let frameworks = FrameworkTables::with_builtin()?;
        let find = |type_name: &str, name: &str| frameworks.find(Some("android"), type_name, name);

        assert_eq!(find("attr", "label"), Some(ResourceId::from(0x0101_0001)));
        assert_eq!(find("attr", "versionCode"), Some(ResourceId::from(0x0101_021b)));
        assert_eq!(find("attr", "roundIcon"), Some(ResourceId::from(0x0101_052c)));
        assert_eq!(find("style", "Theme.Light"), Some(ResourceId::from(0x0103_000c)));
        assert_eq!(find("id", "text1"), Some(ResourceId::from(0x0102_0014)));
        assert_eq!(find("attr", "nonexistent"), None);
        Ok(())
    }

    #[test]
    fn test_builtin_enum_symbols() -> Result<(), TableError> {
        let frameworks = FrameworkTables::with_builtin()?;
        let store = EntryStore::new(vec![], &frameworks);

        let orientation = store
            .attribute(ResourceId::from(0x0101_00c4))
            .ok_or(TableError::NoPackage)?;
        assert!(orientation.format.enumeration());
        assert_eq!(orientation.symbol_value("vertical"), Some(1));

        let width = store
            .attribute(ResourceId::from(0x0101_00f4))
            .ok_or(TableError::NoPackage)?;
        assert!(width.format.dimension());
        assert_eq!(width.symbol_value("wrap_content"), Some(-2i32 as u32));
        Ok(())
    }

    #[test]
    fn test_builtin_table_survives_encoding() -> Result<(), TableError> {
        let table = builtin_android_table()?;
        let read = ResourceTable::read(&table.write()?)?;
        assert_eq!(
            read.packages()[0].find("attr", "allowBackup"),
            Some(ResourceId::from(0x0101_0280))
        );
        Ok(())
    }
}
