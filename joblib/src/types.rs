pub type Program = String;
pub type Args = Vec<String>;
pub type JobId = String;
pub type OutputBlob = bytes::Bytes;
/// One line of captured output, without its line terminator.
pub type OutputLine = bytes::Bytes;
