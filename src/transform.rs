use glam::Mat4;

/// Working model-view matrix with a LIFO of saved copies.
#[derive(Debug, Clone)]
pub struct TransformStack {
    current: Mat4,
    saved: Vec<Mat4>,
}

impl Default for TransformStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformStack {
    pub fn new() -> Self {
        Self {
            current: Mat4::IDENTITY,
            saved: Vec::new(),
        }
    }

    /// Saves a copy of the working matrix.
    pub fn push(&mut self) {
        self.saved.push(self.current);
    }

    /// Restores the most recently saved matrix.
    ///
    /// # Panics
    ///
    /// Panics when nothing has been pushed.
    pub fn pop(&mut self) {
        self.current = self
            .saved
            .pop()
            .expect("transform stack underflow: pop without matching push");
    }

    pub fn current(&self) -> Mat4 {
        self.current
    }

    pub fn set_current(&mut self, matrix: Mat4) {
        self.current = matrix;
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}
