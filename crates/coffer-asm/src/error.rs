//! Assembly-time errors.
//!
//! All errors are fatal to the current assembly run; no partial class file
//! is produced.

#[derive(Debug, Clone, thiserror::Error)]
pub enum AsmError {
    /// A chain of labelled pool references closed on itself. The cycle
    /// lists the labels in resolution order, ending with the repeat.
    #[error("recursive constant pool reference: {}", cycle.join(", "))]
    RecursivePoolReference { cycle: Vec<String> },

    /// A labelled pool reference names a label that was never bound.
    #[error("undefined constant pool label: {0}")]
    UndefinedPoolLabel(String),

    /// An instruction or catch directive refers to an unknown code label.
    #[error("undefined label: {label}\ndefined labels for current method are: {}", known.join(", "))]
    UndefinedLabel { label: String, known: Vec<String> },

    /// `.const` may only bind labels, not direct pool indices.
    #[error("assigning to direct constant pool indices is not supported")]
    UnsupportedAssignment,
}

pub type AsmResult<T> = Result<T, AsmError>;
