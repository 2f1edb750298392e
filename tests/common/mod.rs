#![allow(dead_code)]

use apkres_rs::archive::{Archive, MANIFEST_PATH, RESOURCE_TABLE_PATH};
use apkres_rs::resource::encode_materials::EncodeMaterials;
use apkres_rs::resource::framework::FrameworkTables;
use apkres_rs::table::config::ResConfig;
use apkres_rs::table::res_value::ResValue;
use apkres_rs::table::{EntryValue, ResourceTable};
use apkres_rs::xml::{axml, XmlDocument, XmlElement, ANDROID_NAMESPACE};
use std::error::Error;

pub const ICON: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
pub const ASSET: &[u8] = b"\x00\x01binary asset\xff";

fn set_string(
    materials: &mut EncodeMaterials,
    config: &ResConfig,
    type_name: &str,
    name: &str,
    value: &str,
) -> Result<(), Box<dyn Error>> {
    let id = materials.get_or_create(config, type_name, name)?;
    let index = materials.intern(value)?;
    materials.set_entry(id, config, EntryValue::Simple(ResValue::string(index)))?;
    Ok(())
}

fn manifest(split: Option<&str>) -> XmlDocument {
    let root = XmlElement::new("manifest")
        .with_attribute("xmlns:android", ANDROID_NAMESPACE)
        .with_attribute("package", "com.example");
    let root = match split {
        Some(split) => root.with_attribute("split", &format!("config.{split}")),
        None => root
            .with_attribute("android:versionCode", "7")
            .with_attribute("android:versionName", "1.0")
            .with_child(XmlElement::new("application").with_attribute("android:label", "@string/app_name")),
    };
    XmlDocument::new(root)
}

fn layout() -> XmlDocument {
    XmlDocument::new(
        XmlElement::new("LinearLayout")
            .with_attribute("xmlns:android", ANDROID_NAMESPACE)
            .with_attribute("android:orientation", "vertical")
            .with_child(XmlElement::new("TextView").with_attribute("android:text", "@string/app_name")),
    )
}

/// A base apk with a table, a binary manifest and layout, a renamed drawable and an asset.
pub fn base_apk() -> Result<Vec<u8>, Box<dyn Error>> {
    let frameworks = FrameworkTables::with_builtin()?;
    let mut table = ResourceTable::new(0x7f, "com.example");
    let default = ResConfig::default();
    let mut archive = Archive::new();
    {
        let mut materials = EncodeMaterials::new(Some(&mut table), 0, &[], &frameworks);
        set_string(&mut materials, &default, "string", "app_name", "Example")?;
        set_string(&mut materials, &ResConfig::parse("hdpi")?, "drawable", "icon", "res/a0.png")?;
        set_string(&mut materials, &default, "layout", "main", "res/layout/main.xml")?;
        let foo = materials.get_or_create(&default, "id", "foo")?;
        materials.set_entry(foo, &default, EntryValue::Simple(ResValue::boolean(false)))?;

        archive.put(MANIFEST_PATH, axml::encode(&manifest(None), &mut materials)?);
        archive.put("res/layout/main.xml", axml::encode(&layout(), &mut materials)?);
    }
    archive.put(RESOURCE_TABLE_PATH, table.write()?);
    archive.put("res/a0.png", ICON.to_vec());
    archive.put("assets/data.bin", ASSET.to_vec());
    Ok(archive.to_bytes()?)
}

/// A split apk for `config` (`de`, `xxhdpi`...) with an empty table of the same package.
pub fn split_apk(config: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let frameworks = FrameworkTables::with_builtin()?;
    let mut table = ResourceTable::new(0x7f, "com.example");
    let mut archive = Archive::new();
    {
        let mut materials = EncodeMaterials::new(Some(&mut table), 0, &[], &frameworks);
        archive.put(MANIFEST_PATH, axml::encode(&manifest(Some(config)), &mut materials)?);
    }
    archive.put(RESOURCE_TABLE_PATH, table.write()?);
    Ok(archive.to_bytes()?)
}

/// An apk with nothing but a manifest.
pub fn tableless_apk() -> Result<Vec<u8>, Box<dyn Error>> {
    let frameworks = FrameworkTables::with_builtin()?;
    let mut archive = Archive::new();
    let mut materials = EncodeMaterials::new(None, 0, &[], &frameworks);
    let manifest = XmlDocument::new(
        XmlElement::new("manifest")
            .with_attribute("xmlns:android", ANDROID_NAMESPACE)
            .with_attribute("package", "com.example.bare")
            .with_attribute("android:versionName", "2.0"),
    );
    archive.put(MANIFEST_PATH, axml::encode(&manifest, &mut materials)?);
    Ok(archive.to_bytes()?)
}
