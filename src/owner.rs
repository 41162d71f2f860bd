use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::{BoxError, Error};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub name: String,
    /// Phone number, used for the short-message channel
    pub contact: String,
    pub email: String,
}

/// Maps a plate to the registered owner.
pub trait OwnerResolver: Send + Sync {
    fn lookup(&self, plate: &str) -> Result<Option<Owner>, BoxError>;
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    owner: Vec<RegistryEntry>,
}

#[derive(Deserialize)]
struct RegistryEntry {
    plate: String,
    #[serde(flatten)]
    owner: Owner,
}

/// One row of a `plate_number,name,contact,email` CSV export.
#[derive(Deserialize)]
struct CsvEntry {
    plate_number: String,
    name: String,
    contact: String,
    email: String,
}

/// In-memory registry, loaded once from a TOML file of `[[owner]]` tables:
///
/// ```toml
/// [[owner]]
/// plate = "MH12AB1234"
/// name = "A. Driver"
/// contact = "+911234567890"
/// email = "driver@example.com"
/// ```
///
/// or from a CSV file with a `plate_number,name,contact,email` header.
#[derive(Debug, Default, Clone)]
pub struct OwnerRegistry {
    owners: HashMap<String, Owner>,
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        let file: RegistryFile = toml::from_str(raw)?;

        let mut registry = Self::new();
        for entry in file.owner {
            registry.insert(&entry.plate, entry.owner);
        }

        Ok(registry)
    }

    /// Picks the CSV loader for `.csv` files and TOML for anything else.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        if is_csv {
            Self::from_csv_path(path)
        } else {
            Self::from_path(path)
        }
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, Error> {
        Self::from_csv_reader(std::fs::File::open(path)?)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, Error> {
        let mut rows = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut registry = Self::new();
        for row in rows.deserialize() {
            let entry: CsvEntry = row?;
            registry.insert(
                &entry.plate_number,
                Owner {
                    name: entry.name,
                    contact: entry.contact,
                    email: entry.email,
                },
            );
        }

        Ok(registry)
    }

    /// Plates are matched case-insensitively.
    pub fn insert(&mut self, plate: &str, owner: Owner) {
        self.owners.insert(plate.trim().to_uppercase(), owner);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl OwnerResolver for OwnerRegistry {
    fn lookup(&self, plate: &str) -> Result<Option<Owner>, BoxError> {
        Ok(self.owners.get(&plate.to_uppercase()).cloned())
    }
}
