/// What went wrong, independent of which stream it went wrong in.
///
/// Nothing at this layer is retried or repaired; callers use the kind to
/// decide whether to abort or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The dataset (or one of its sibling files) does not exist.
    MissingFile,
    /// A fixed preamble failed a structural check.
    CorruptHeader,
    /// A record's bytes disagree with its header or with its own counts.
    CorruptRecord,
    /// ".shp" and ".dbf" disagree on how many records there are.
    StreamDesynchronization,
    /// A value or column cannot be represented in the declared schema.
    SchemaViolation,
    /// A write session wrote more or fewer records than it declared.
    RecordCount,
    /// The underlying storage failed.
    Io,
}
