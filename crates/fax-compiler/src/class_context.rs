//! One per enclosing class body being compiled, tracking just enough to
//! validate `this`/`super` usage.

pub struct ClassContext {
    pub has_superclass: bool,
}
