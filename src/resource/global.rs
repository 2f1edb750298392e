//! One resource namespace over every member of a bundle.

use crate::apk::bundle::MemberId;
use crate::apk::ApkError;
use crate::resource::entry_store::EntryStore;
use crate::resource::framework::FrameworkTables;
use crate::resource::value::Resource;
use crate::resource::ResourceError;
use crate::table::config::ResConfig;
use crate::table::resource_id::ResourceId;
use crate::table::ResourceTable;

/// Read-only view over the tables of a base apk and its splits, base first. Members without
/// a resource table are left out.
pub struct GlobalResources<'a> {
    members: Vec<(MemberId, &'a ResourceTable)>,
    frameworks: &'a FrameworkTables,
}

impl<'a> GlobalResources<'a> {
    pub fn new(members: Vec<(MemberId, &'a ResourceTable)>, frameworks: &'a FrameworkTables) -> Self {
        Self { members, frameworks }
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberId> {
        self.members.iter().map(|(member, _)| member)
    }

    pub fn has_table(&self) -> bool {
        !self.members.is_empty()
    }

    pub fn entry_store(&self) -> EntryStore<'a> {
        EntryStore::new(
            self.members.iter().map(|(_, table)| *table).collect(),
            self.frameworks,
        )
    }

    pub fn find(&self, type_name: &str, name: &str) -> Option<ResourceId> {
        self.members
            .iter()
            .flat_map(|(_, table)| table.packages())
            .find_map(|package| package.find(type_name, name))
    }

    /// Id of `type_name/name`, whichever member declares it.
    pub fn resolve(&self, type_name: &str, name: &str) -> Result<ResourceId, ApkError> {
        self.find(type_name, name).ok_or_else(|| ApkError::Reference {
            reference: format!("@{type_name}/{name}"),
        })
    }

    /// Members holding a value for `id` in at least one configuration.
    pub fn declared_by(&self, id: ResourceId) -> Vec<&MemberId> {
        self.members
            .iter()
            .filter(|(_, table)| {
                table
                    .package(id.package())
                    .is_some_and(|package| !package.entry_configs(id).is_empty())
            })
            .map(|(member, _)| member)
            .collect()
    }

    /// Value of `type_name/name` in the configuration `qualifiers`, from the first member that
    /// holds one.
    pub fn get(&self, type_name: &str, name: &str, qualifiers: &str) -> Result<Option<Resource>, ApkError> {
        let config = ResConfig::parse(qualifiers).map_err(ResourceError::from)?;
        let store = self.entry_store();
        for (_, table) in &self.members {
            for package in table.packages() {
                let Some(entry) = package
                    .find(type_name, name)
                    .and_then(|id| package.entry(id, &config))
                else {
                    continue;
                };
                return Ok(Resource::from_entry(type_name, entry, table.strings(), &store));
            }
        }
        Ok(None)
    }
}
