// pool - Generational object pools with stable handles
//
// Objects live in one contiguous block and are addressed through 32-bit
// handles that survive pool growth and detect slot reuse.

mod iter;
mod object_pool;

pub use iter::{Iter, IterMut};
pub use object_pool::{ObjectPool, PoolError};
