use colored::Colorize;

use crate::error::Result;
use crate::reference::ReferenceRegistry;
use crate::settings::load_settings;

#[derive(Debug, Clone, Copy)]
pub enum ListKind {
    Companies,
    Locations,
}

impl ListKind {
    fn singular(self) -> &'static str {
        match self {
            ListKind::Companies => "company",
            ListKind::Locations => "location",
        }
    }
}

pub fn add(kind: ListKind, name: &str) -> Result<()> {
    let settings = load_settings();
    let store = super::open_store(&settings)?;
    let refs = ReferenceRegistry::open(&store, settings.shared_reference_data)?;
    let result = match kind {
        ListKind::Companies => refs.add_company(&store, name),
        ListKind::Locations => refs.add_location(&store, name),
    };
    let stored = result?;
    println!("Added {}: {}", kind.singular(), stored.as_str().green());
    Ok(())
}

pub fn list(kind: ListKind) -> Result<()> {
    let settings = load_settings();
    let store = super::open_store(&settings)?;
    let refs = ReferenceRegistry::open(&store, settings.shared_reference_data)?;
    let (title, items) = match kind {
        ListKind::Companies => ("Companies", refs.companies()),
        ListKind::Locations => ("Locations", refs.locations()),
    };
    let source = if refs.is_shared() { "shared" } else { "fixed" };
    println!("{} ({source})", title.bold());
    for item in items {
        println!("  {item}");
    }
    Ok(())
}
