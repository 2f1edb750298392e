use std::fs;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub fn get_file_as_byte_vec(filename: &Path) -> Result<Vec<u8>, std::io::Error> {
    let metadata = fs::metadata(filename)?;
    let mut buffer = vec![0; metadata.len() as usize];

    let mut f = File::open(filename)?;
    f.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Normalizes a virtual path: forward slashes, no leading slash, no `.` components and
/// `..` resolved.
pub fn normalize_path(path: &str) -> String {
    let mut components: Vec<&str> = vec![];
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            component => components.push(component),
        }
    }
    components.join("/")
}

/// The parts of a `res/<type>[-<qualifiers>]/<file>` path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResPath<'p> {
    /// Directory type, `drawable` or `values`.
    pub directory: &'p str,
    pub qualifiers: &'p str,
    pub file_name: &'p str,
}

impl<'p> ResPath<'p> {
    /// Parses `path` when it has exactly two separators and lives in `res/`.
    pub fn parse(path: &'p str) -> Option<Self> {
        let mut parts = path.split('/');
        let (root, directory, file_name) = (parts.next()?, parts.next()?, parts.next()?);
        if root != "res" || parts.next().is_some() || directory.is_empty() || file_name.is_empty() {
            return None;
        }
        let (directory, qualifiers) = directory.split_once('-').unwrap_or((directory, ""));
        Some(Self {
            directory,
            qualifiers,
            file_name,
        })
    }

    /// Resource name of the file: everything before the first `.`.
    pub fn name(&self) -> &'p str {
        self.file_name
            .split_once('.')
            .map_or(self.file_name, |(name, _)| name)
    }

    pub fn is_values(&self) -> bool {
        self.directory == "values"
    }

    /// Resource type held by a values file, `strings.xml` holds `string`.
    pub fn values_type(&self) -> &'p str {
        let stem = self.name();
        if stem == "plurals" {
            return stem;
        }
        stem.strip_suffix('s').unwrap_or(stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/res//drawable/./icon.png"), "res/drawable/icon.png");
        assert_eq!(normalize_path("res\\layout\\..\\values\\strings.xml"), "res/values/strings.xml");
        assert_eq!(normalize_path("AndroidManifest.xml"), "AndroidManifest.xml");
    }

    #[test]
    fn test_res_path() {
        let path = ResPath::parse("res/drawable-hdpi-v21/icon.9.png").unwrap();
        assert_eq!(path.directory, "drawable");
        assert_eq!(path.qualifiers, "hdpi-v21");
        assert_eq!(path.name(), "icon");
        assert!(!path.is_values());

        assert!(ResPath::parse("res/icon.png").is_none());
        assert!(ResPath::parse("res/drawable/nested/icon.png").is_none());
        assert!(ResPath::parse("assets/drawable/icon.png").is_none());
    }

    #[test]
    fn test_values_type() {
        let type_of = |path: &str| ResPath::parse(path).unwrap().values_type().to_string();
        assert_eq!(type_of("res/values/strings.xml"), "string");
        assert_eq!(type_of("res/values-de/arrays.xml"), "array");
        assert_eq!(type_of("res/values/plurals.xml"), "plurals");
        assert_eq!(type_of("res/values/ids.xml"), "id");
    }
}
