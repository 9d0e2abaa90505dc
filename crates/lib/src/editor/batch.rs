//! Scoped batching of local edits.

use tracing::error;

use super::Editor;
use crate::Result;

/// Defers sending while alive.
///
/// Edits applied while any batch is open are visible in `Editor::current`
/// immediately but are sent as one operation when the outermost batch ends.
/// Batches nest; only closing the last one submits the composed edit.
///
/// Dropping the batch submits as well, logging any failure. Use
/// [`EditorBatch::finish`] to observe the error instead.
#[derive(Debug)]
#[must_use = "the batch ends as soon as it is dropped"]
pub struct EditorBatch<'a> {
    editor: &'a Editor,
    finished: bool,
}

impl<'a> EditorBatch<'a> {
    pub(super) fn new(editor: &'a Editor) -> Self {
        Self {
            editor,
            finished: false,
        }
    }

    pub fn editor(&self) -> &Editor {
        self.editor
    }

    /// End this scope, submitting the batch if it is the outermost one.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.editor.end_batch()
    }
}

impl Drop for EditorBatch<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.editor.end_batch() {
            error!(editor = self.editor.id(), "Failed to submit batched edits: {err}");
        }
    }
}
