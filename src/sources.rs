use thiserror::Error;

/// Every upstream listing origin the watcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Jetaa,
    JapanHouse,
    JapanSociety,
    Embassy,
    JapanFoundation,
    DaiwaFoundation,
}

impl Source {
    pub const ALL: [Source; 6] = [
        Source::Jetaa,
        Source::JapanHouse,
        Source::JapanSociety,
        Source::Embassy,
        Source::JapanFoundation,
        Source::DaiwaFoundation,
    ];

    /// Identifier carried in `event_source` on each record.
    pub fn id(self) -> &'static str {
        match self {
            Source::Jetaa => "jetaa",
            Source::JapanHouse => "japan_house",
            Source::JapanSociety => "japan_society",
            Source::Embassy => "embassy",
            Source::JapanFoundation => "japan_foundation",
            Source::DaiwaFoundation => "daiwa_foundation",
        }
    }

    /// Bucket label used as the key of a snapshot body.
    pub fn label(self) -> &'static str {
        match self {
            Source::Jetaa => "JETAA",
            Source::JapanHouse => "JAPAN_HOUSE",
            Source::JapanSociety => "JAPAN_SOCIETY",
            Source::Embassy => "JAPAN_EMBASSY",
            Source::JapanFoundation => "JAPAN_FOUNDATION",
            Source::DaiwaFoundation => "DAIWA_FOUNDATION",
        }
    }

    pub fn from_id(id: &str) -> Option<Source> {
        Source::ALL.into_iter().find(|source| source.id() == id)
    }

    pub fn meta(self) -> &'static SourceMeta {
        SOURCES
            .iter()
            .find(|meta| meta.source == Some(self))
            .unwrap_or(&DEFAULT_META)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailField {
    Name,
    Location,
    Date,
    Time,
    Price,
}

impl DetailField {
    pub fn heading(self) -> &'static str {
        match self {
            DetailField::Name => "Event Name",
            DetailField::Location => "Location",
            DetailField::Date => "Date",
            DetailField::Time => "Time",
            DetailField::Price => "Price",
        }
    }
}

/// Presentation data for one source's notifications.
#[derive(Debug)]
pub struct SourceMeta {
    pub source: Option<Source>,
    pub display_name: &'static str,
    pub logo_url: &'static str,
    pub details: &'static [DetailField],
}

pub static SOURCES: &[SourceMeta] = &[
    SourceMeta {
        source: Some(Source::Jetaa),
        display_name: "JETAA Calendar",
        logo_url: "https://cdn.iconscout.com/icon/free/png-512/free-calendar-766-267585.png?f=webp&w=512",
        details: &[
            DetailField::Name,
            DetailField::Date,
            DetailField::Time,
            DetailField::Price,
        ],
    },
    SourceMeta {
        source: Some(Source::JapanHouse),
        display_name: "Japan House",
        logo_url: "https://event-source-logos.s3.eu-west-2.amazonaws.com/japan_house.png",
        details: &[DetailField::Name, DetailField::Location, DetailField::Date],
    },
    SourceMeta {
        source: Some(Source::JapanSociety),
        display_name: "Japan Society",
        logo_url: "https://event-source-logos.s3.eu-west-2.amazonaws.com/japan_society.jpeg",
        details: &[DetailField::Name, DetailField::Date],
    },
    SourceMeta {
        source: Some(Source::Embassy),
        display_name: "Embassy",
        logo_url: "https://event-source-logos.s3.eu-west-2.amazonaws.com/japan_embassy.png",
        details: &[DetailField::Name, DetailField::Date, DetailField::Location],
    },
    SourceMeta {
        source: Some(Source::JapanFoundation),
        display_name: "Japan Foundation",
        logo_url: "https://event-source-logos.s3.eu-west-2.amazonaws.com/japan_foundation.jpeg",
        details: &[DetailField::Name, DetailField::Date],
    },
    SourceMeta {
        source: Some(Source::DaiwaFoundation),
        display_name: "Daiwa Foundation",
        logo_url: "https://event-source-logos.s3.eu-west-2.amazonaws.com/daiwa_foundation_logo.png",
        details: &[
            DetailField::Name,
            DetailField::Date,
            DetailField::Time,
            DetailField::Location,
        ],
    },
];

pub static DEFAULT_META: SourceMeta = SourceMeta {
    source: None,
    display_name: "Event Listings",
    logo_url: "https://cdn.iconscout.com/icon/free/png-512/free-calendar-766-267585.png?f=webp&w=512",
    details: &[DetailField::Name, DetailField::Date],
};

/// Metadata for a raw `event_source` id, falling back to [`DEFAULT_META`].
pub fn meta_for_id(id: &str) -> &'static SourceMeta {
    Source::from_id(id).map_or(&DEFAULT_META, Source::meta)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no metadata registered for sources: {0:?}")]
    Missing(Vec<&'static str>),
    #[error("metadata registered more than once for {0}")]
    Duplicate(&'static str),
}

/// Checked once at startup so a source added to [`Source::ALL`] without a
/// table entry cannot silently fall back to the default card.
pub fn validate_registry() -> Result<(), RegistryError> {
    validate_table(SOURCES)
}

fn validate_table(table: &[SourceMeta]) -> Result<(), RegistryError> {
    for source in Source::ALL {
        let count = table
            .iter()
            .filter(|meta| meta.source == Some(source))
            .count();
        if count > 1 {
            return Err(RegistryError::Duplicate(source.id()));
        }
    }

    let missing: Vec<&'static str> = Source::ALL
        .into_iter()
        .filter(|source| !table.iter().any(|meta| meta.source == Some(*source)))
        .map(Source::id)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::Missing(missing))
    }
}
