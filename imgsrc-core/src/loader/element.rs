use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ElementState {
    src: String,
    natural_size: Option<(u32, u32)>,
    detached: bool,
}

/// Stand-in for a platform image handle: a load target plus the natural
/// dimensions once known.
#[derive(Debug, Default)]
pub(crate) struct ImageElement {
    state: Mutex<ElementState>,
}

impl ImageElement {
    pub(crate) fn src(&self) -> String {
        self.state.lock().src.clone()
    }

    /// Assigns the load target. Returns `false` once the element has been
    /// cleared; the caller owns whatever it tried to assign.
    pub(crate) fn set_src(&self, src: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if state.detached {
            return false;
        }
        state.src = src.into();
        true
    }

    pub(crate) fn natural_size(&self) -> Option<(u32, u32)> {
        self.state.lock().natural_size
    }

    pub(crate) fn set_natural_size(&self, size: (u32, u32)) {
        self.state.lock().natural_size = Some(size);
    }

    /// Empties the load target, refuses further assignments and hands back
    /// the target that was cleared.
    pub(crate) fn clear(&self) -> String {
        let mut state = self.state.lock();
        state.detached = true;
        std::mem::take(&mut state.src)
    }
}
