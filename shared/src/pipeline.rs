/// Logical delivery guarantee requested by the application for one send.
///
/// Anything other than `Sequenced` or `Reliable` degrades to best-effort
/// unreliable delivery rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SendMode {
    #[default]
    Default,
    Unreliable,
    Sequenced,
    Reliable,
}

/// Identifies one delivery channel on the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pipeline(u32);

impl Pipeline {
    /// The null pipeline, which every socket treats as its unreliable channel.
    pub const NULL: Pipeline = Pipeline(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// The three channel handles created exactly once when the underlying socket
/// is created. Immutable for the socket's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineSet {
    unreliable: Pipeline,
    sequenced: Pipeline,
    reliable: Pipeline,
}

impl PipelineSet {
    pub const fn new(unreliable: Pipeline, sequenced: Pipeline, reliable: Pipeline) -> Self {
        Self {
            unreliable,
            sequenced,
            reliable,
        }
    }

    /// Maps a logical send mode to an underlying delivery channel.
    pub fn select(&self, mode: SendMode) -> Pipeline {
        match mode {
            SendMode::Sequenced => self.sequenced,
            SendMode::Reliable => self.reliable,
            _ => self.unreliable,
        }
    }

    pub fn unreliable(&self) -> Pipeline {
        self.unreliable
    }

    pub fn sequenced(&self) -> Pipeline {
        self.sequenced
    }

    pub fn reliable(&self) -> Pipeline {
        self.reliable
    }
}
