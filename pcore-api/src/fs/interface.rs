//! File-system collaborator interface
//!
//! The process core only holds references into the file system: open-file
//! handles in each process's resource table and the working directory.
//! Reference counts live on the other side of this trait.

/// Counted reference to an open file. Not `Clone`: duplicate through
/// [`FileSystem::dup`] so the collaborator sees every new reference.
#[derive(Debug, PartialEq, Eq)]
pub struct FileRef(pub usize);

/// Counted reference to an in-memory inode.
#[derive(Debug, PartialEq, Eq)]
pub struct InodeRef(pub usize);

pub trait FileSystem: Send + Sync {
    /// One-time initialization. Must run from process context.
    fn init(&self, dev: u32);

    fn dup(&self, file: &FileRef) -> FileRef;
    fn close(&self, file: FileRef);

    fn idup(&self, inode: &InodeRef) -> InodeRef;
    fn iput(&self, inode: InodeRef);

    /// Resolves `path` relative to the root; `None` if it does not exist.
    fn namei(&self, path: &str) -> Option<InodeRef>;

    /// Brackets a file-system transaction.
    fn begin_op(&self);
    fn end_op(&self);
}
