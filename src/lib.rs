//! `apkres-rs` edits the resources of Android apks and split apk bundles through a virtual
//! file system.
//!
//! Files are addressed by the paths they would have in an unpacked project
//! (`res/drawable-hdpi/icon.png`, `res/values-de/strings.xml`, `AndroidManifest.xml`) even
//! when the apk stores them under shortened names or only as entries of `resources.arsc`.
//!
//! With apkres-rs, you can:
//!
//! - Open any file of an apk as editable text or bytes, binary XML included.
//! - Edit `res/values*` files, which are views over the resource table.
//! - Reference resources that are only declared later in the session.
//! - Set strings, arrays, styles and plurals directly.
//! - Resolve names across a base apk and its splits.
//!
//! ```no_run
//! use apkres_rs::apk::{Apk, ApkOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), apkres_rs::apk::ApkError> {
//! let mut apk = Apk::open(Path::new("base.apk"), &ApkOptions::default())?;
//! let mut resources = apk.resources();
//! let mut strings = resources.open_file("res/values/strings.xml")?;
//! let text = strings.read_text().replace("Hello", "Hi");
//! strings.write_text(&text);
//! strings.close(&mut resources)?;
//! apk.finalize()?;
//! apk.save(Path::new("patched.apk"))?;
//! # Ok(())
//! # }
//! ```

pub mod apk;
pub mod archive;
pub mod resource;
pub mod table;
pub mod utils;
pub mod xml;
