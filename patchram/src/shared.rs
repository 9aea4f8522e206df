use crate::transport::Transport;
use crate::Patchram;
use spin::Mutex;

/// A [`Patchram`] session shared between threads. Every closure passed to
/// [`SharedPatchram::with`] runs with exclusive access, so a slot commit is
/// never interleaved with another mutation.
pub struct SharedPatchram<'p, T: Transport> {
    inner: Mutex<Patchram<'p, T>>,
}

impl<'p, T: Transport> SharedPatchram<'p, T> {
    pub fn new(patchram: Patchram<'p, T>) -> Self {
        SharedPatchram {
            inner: Mutex::new(patchram),
        }
    }

    pub fn with<R, F: FnOnce(&mut Patchram<'p, T>) -> R>(&self, f: F) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn into_inner(self) -> Patchram<'p, T> {
        self.inner.into_inner()
    }
}
