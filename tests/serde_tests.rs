#![cfg(feature = "serde")]

use apkres_rs::apk::bundle::MemberId;
use apkres_rs::apk::{ApkOptions, EntryCompression, PackageMetadata, SplitKind};
use apkres_rs::table::resource_id::ResourceId;
use apkres_rs::table::ResourceTable;

#[test]
fn test_options_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut options = ApkOptions::new();
    options
        .with_compression(EntryCompression::Stored)
        .with_builtin_framework(false)
        .with_framework_file("framework-res.apk")
        .with_framework_table(ResourceTable::new(0x02, "com.vendor"));

    let json = serde_json::to_string(&options)?;
    let restored: ApkOptions = serde_json::from_str(&json)?;
    assert_eq!(restored.compression, EntryCompression::Stored);
    assert!(!restored.builtin_framework);
    assert_eq!(restored.framework_files, options.framework_files);
    // Tables are not serialized.
    assert!(restored.framework_tables.is_empty());
    Ok(())
}

#[test]
fn test_metadata_and_members() -> Result<(), Box<dyn std::error::Error>> {
    let metadata = PackageMetadata {
        package_name: "com.example".to_string(),
        package_version: "1.0".to_string(),
        version_code: Some(7),
    };
    let restored: PackageMetadata = serde_json::from_str(&serde_json::to_string(&metadata)?)?;
    assert_eq!(restored, metadata);

    let members = vec![MemberId::Base, MemberId::Split("de".to_string())];
    let restored: Vec<MemberId> = serde_json::from_str(&serde_json::to_string(&members)?)?;
    assert_eq!(restored, members);

    let kind: SplitKind = serde_json::from_str(&serde_json::to_string(&SplitKind::Library)?)?;
    assert_eq!(kind, SplitKind::Library);
    Ok(())
}

#[test]
fn test_resource_id_is_hex() -> Result<(), Box<dyn std::error::Error>> {
    let id = ResourceId::new(0x7f, 0x01, 0x0002);
    let json = serde_json::to_string(&id)?;
    assert_eq!(json, r#"{"id":"0x7f010002"}"#);
    let restored: ResourceId = serde_json::from_str(&json)?;
    assert_eq!(restored, id);
    Ok(())
}
