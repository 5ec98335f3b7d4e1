use crate::api::SplitError;
use crate::progress::Stage;

/// Column whose value decides which partition a row lands in.
pub const SPLIT_COLUMN: &str = "gender";

const FIELD_DELIMITER: char = ',';

/// The two output groups. Labels are matched case-sensitively; rows carrying
/// anything else are excluded from both outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Male,
    Female,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Male, Partition::Female];

    pub fn label(self) -> &'static str {
        match self {
            Partition::Male => "male",
            Partition::Female => "female",
        }
    }

    pub fn stage(self) -> Stage {
        match self {
            Partition::Male => Stage::GzipMale,
            Partition::Female => Stage::GzipFemale,
        }
    }

    /// Entry name inside the output archive.
    pub fn entry_name(self) -> &'static str {
        match self {
            Partition::Male => "male.csv.gz",
            Partition::Female => "female.csv.gz",
        }
    }

    /// Fixed position in the archive, independent of which compressor
    /// finishes first.
    pub fn index(self) -> usize {
        match self {
            Partition::Male => 0,
            Partition::Female => 1,
        }
    }
}

/// First line of the upload. Immutable once observed; owns the column
/// layout for the rest of the job.
#[derive(Debug)]
pub struct HeaderRow {
    line: String,
}

impl HeaderRow {
    pub fn parse(line: String) -> Self {
        Self { line }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    fn index_of(&self, column: &str) -> Option<usize> {
        self.line
            .split(FIELD_DELIMITER)
            .position(|name| name == column)
    }
}

/// Classifies data lines into a partition. The designated column's index is
/// resolved against the header once and reused for every line.
#[derive(Debug)]
pub struct RowRouter {
    header: HeaderRow,
    column_index: usize,
}

impl RowRouter {
    pub fn new(header: HeaderRow) -> Result<Self, SplitError> {
        let column_index = header
            .index_of(SPLIT_COLUMN)
            .ok_or_else(|| SplitError::Schema(SPLIT_COLUMN.to_string()))?;
        Ok(Self {
            header,
            column_index,
        })
    }

    pub fn header_line(&self) -> &str {
        self.header.line()
    }

    /// `None` means the row matches neither label and is silently dropped.
    pub fn classify(&self, line: &str) -> Option<Partition> {
        let field = line.split(FIELD_DELIMITER).nth(self.column_index)?;
        Partition::ALL.into_iter().find(|p| p.label() == field)
    }
}
