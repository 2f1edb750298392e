use indexmap::IndexMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::apk::{Apk, ApkError, ApkOptions};
use crate::resource::container::Resources;
use crate::resource::global::GlobalResources;
use crate::table::ResourceTable;

/// A member of a bundle: the base apk or the split configured for a qualifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemberId {
    Base,
    Split(String),
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberId::Base => f.write_str("base"),
            MemberId::Split(config) => f.write_str(config),
        }
    }
}

/// A base apk and its configuration splits.
///
/// Each member keeps its own table. References are resolved across members, so a split can
/// point at resources of the base and ids created in a split do not collide with the base's.
#[derive(Debug)]
pub struct ApkBundle {
    base: Apk,
    splits: IndexMap<String, Apk>,
}

impl ApkBundle {
    pub fn new(base: Apk, splits: impl IntoIterator<Item = Apk>) -> Result<Self, ApkError> {
        if !base.role().is_base() {
            return Err(ApkError::InvalidBundle(format!("{} is not a base apk", base.role())));
        }
        let mut bundle = Self {
            base,
            splits: IndexMap::new(),
        };
        for split in splits {
            let config = split_config(&split)?;
            if bundle.splits.contains_key(&config) {
                return Err(ApkError::InvalidBundle(format!("duplicate split {config}")));
            }
            bundle.splits.insert(config, split);
        }
        Ok(bundle)
    }

    /// Opens the base apk and every split, sharing one set of framework tables.
    pub fn open(base: &Path, splits: &[PathBuf], options: &ApkOptions) -> Result<Self, ApkError> {
        let frameworks = Arc::new(options.frameworks()?);
        let base = Apk::open_linked(base, options, frameworks.clone())?;

        #[cfg(feature = "rayon")]
        let splits = splits
            .par_iter()
            .map(|path| Apk::open_linked(path, options, frameworks.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        #[cfg(not(feature = "rayon"))]
        let splits = splits
            .iter()
            .map(|path| Apk::open_linked(path, options, frameworks.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(base, splits)
    }

    pub fn base(&self) -> &Apk {
        &self.base
    }

    pub fn split(&self, config: &str) -> Option<&Apk> {
        self.splits.get(config)
    }

    pub fn splits(&self) -> impl Iterator<Item = &Apk> {
        self.splits.values()
    }

    pub fn apk(&self, member: &MemberId) -> Option<&Apk> {
        match member {
            MemberId::Base => Some(&self.base),
            MemberId::Split(config) => self.splits.get(config),
        }
    }

    /// Base first, then the splits in the order they were added.
    pub fn members(&self) -> Vec<MemberId> {
        std::iter::once(MemberId::Base)
            .chain(self.splits.keys().cloned().map(MemberId::Split))
            .collect()
    }

    /// Replaces the split with the same configuration, or adds it. Returns the replaced split.
    pub fn replace_split(&mut self, split: Apk) -> Result<Option<Apk>, ApkError> {
        let config = split_config(&split)?;
        Ok(self.splits.insert(config, split))
    }

    /// A lookup view over the tables of every member.
    pub fn global(&self) -> GlobalResources<'_> {
        let members = self
            .members()
            .into_iter()
            .filter_map(|member| {
                let table = self.apk(&member)?.table()?;
                Some((member, table))
            })
            .collect();
        GlobalResources::new(members, self.base.frameworks())
    }

    /// The resources of `member`, resolving names declared by the other members.
    pub fn resources(&mut self, member: &MemberId) -> Result<Resources<'_>, ApkError> {
        let (apk, linked) = self.member_and_linked(member)?;
        Ok(apk.resources_linked(linked))
    }

    fn member_and_linked(&mut self, member: &MemberId) -> Result<(&mut Apk, Vec<&ResourceTable>), ApkError> {
        match member {
            MemberId::Base => {
                let linked = self.splits.values().filter_map(Apk::table).collect();
                Ok((&mut self.base, linked))
            }
            MemberId::Split(config) => {
                let mut target = None;
                let mut linked: Vec<&ResourceTable> = self.base.table().into_iter().collect();
                for (key, apk) in self.splits.iter_mut() {
                    if key == config {
                        target = Some(apk);
                        continue;
                    }
                    let apk: &Apk = apk;
                    linked.extend(apk.table());
                }
                let apk = target.ok_or_else(|| ApkError::InvalidBundle(format!("no split {config}")))?;
                Ok((apk, linked))
            }
        }
    }

    /// Finalizes the base, then every split.
    pub fn finalize(&mut self) -> Result<(), ApkError> {
        for member in self.members() {
            let (apk, linked) = self.member_and_linked(&member)?;
            apk.finalize_linked(linked)?;
        }
        Ok(())
    }

    /// Writes every member into `directory` under its file name, `base.apk` and
    /// `split_config.<config>.apk`.
    pub fn save(&self, directory: &Path) -> Result<Vec<PathBuf>, ApkError> {
        fs::create_dir_all(directory)?;
        std::iter::once(&self.base)
            .chain(self.splits.values())
            .map(|apk| {
                let path = directory.join(apk.file_name());
                apk.save(&path)?;
                log::info!("Saved {} to {}", apk.role(), path.display());
                Ok(path)
            })
            .collect()
    }
}

fn split_config(split: &Apk) -> Result<String, ApkError> {
    split
        .role()
        .config()
        .map(str::to_string)
        .ok_or_else(|| ApkError::InvalidBundle("a bundle has exactly one base apk".to_string()))
}
