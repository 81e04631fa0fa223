//! Intrusive containers over external storage.
//!
//! Elements carry their own container links. A hash table, an ordered map
//! and a priority queue each thread through a link field embedded in the
//! element, so joining or leaving a container never allocates per element
//! and one element can sit in several containers at once.
//!
//! # Design Philosophy
//!
//! Traditional collections own their data:
//!
//! ```text
//! HashMap<K, V>   - owns values, one container per value
//! BTreeMap<K, V>  - owns values, allocates nodes on insert
//! BinaryHeap<T>   - owns values, no removal from the middle
//! ```
//!
//! This crate inverts the model:
//!
//! ```text
//! Storage (VecStorage, slab::Slab) - owns elements, hands out stable handles
//! Hash / Map / PriorityQueue       - coordinate handles through embedded links
//! ```
//!
//! Links hold handles, not references. An [`Adapter`] picks which link field
//! of the element a container uses, fixed at the type level.
//!
//! # Quick Start
//!
//! ```
//! use nexus_intrusive::{
//!     adapter, hash_key, DynamicHash, HashLink, Map, MapLink, PriorityQueue,
//!     PriorityQueueLink, Storage, VecStorage,
//! };
//!
//! #[derive(Debug)]
//! struct Order {
//!     id: u64,
//!     by_id: HashLink,
//!     by_price: MapLink<u64>,
//!     by_expiry: PriorityQueueLink<u64>,
//! }
//!
//! adapter!(ById = Order { by_id: HashLink });
//! adapter!(ByPrice = Order { by_price: MapLink<u64> });
//! adapter!(ByExpiry = Order { by_expiry: PriorityQueueLink<u64> });
//!
//! let mut orders: VecStorage<Order> = VecStorage::with_capacity(64);
//! let mut ids: DynamicHash<ById> = DynamicHash::new();
//! let mut book: Map<u64, ByPrice> = Map::new();
//! let mut expiry: PriorityQueue<u64, ByExpiry> = PriorityQueue::new();
//!
//! for (id, price, expires) in [(1, 100, 30), (2, 99, 10), (3, 101, 20)] {
//!     let h = orders
//!         .try_insert(Order {
//!             id,
//!             by_id: HashLink::new(),
//!             by_price: MapLink::new(),
//!             by_expiry: PriorityQueueLink::new(),
//!         })
//!         .unwrap();
//!     ids.insert(&mut orders, hash_key(&id), h);
//!     book.insert(&mut orders, price, h);
//!     expiry.insert(&mut orders, expires, h);
//! }
//!
//! // Expire the oldest order everywhere, then free it.
//! let h = expiry.remove_top(&mut orders).unwrap();
//! ids.remove(&mut orders, h);
//! book.remove(&mut orders, h);
//! assert_eq!(orders.remove(h).unwrap().id, 2);
//!
//! let best = book.first(&orders).unwrap();
//! assert_eq!(orders[best].id, 1);
//! assert_eq!(ids.find_first(&orders, hash_key(&3u64)).map(|h| orders[h].id), Some(3));
//! ```
//!
//! # Critical Invariant: Same Storage Instance
//!
//! All operations on a container must use the same storage instance, and an
//! element must leave every container before it leaves storage. Violations
//! cannot cause memory unsafety (links are plain handles) but corrupt the
//! container and usually end in a "does not refer to a live element" panic.
//!
//! # Data Structures
//!
//! | Structure | Use Case | Key Operations |
//! |-----------|----------|----------------|
//! | [`StaticHash`] / [`DynamicHash`] | lookup by hash | O(1) insert, O(chain) find/remove |
//! | [`Map`] | ordered index, rank/select | O(log n) insert/remove/find/position |
//! | [`PriorityQueue`] | timers, schedulers | O(log n) insert/remove, O(1) top |
//!
//! # Feature Flags
//!
//! - `slab` - Enable [`Storage`] impl for `slab::Slab`
//! - `tracing` - Emit resize and misuse events through `tracing`

#![warn(missing_docs)]

pub mod error;
pub mod handle;
pub mod hash;
pub mod heap;
pub mod key;
pub mod link;
pub mod map;
pub mod storage;

mod tracing_helpers;

pub use error::TableError;
pub use handle::Handle;
pub use hash::{
    DYNAMIC, DynamicHash, Hash, HashBuilder, HashLink, STATIC, StaticHash, StaticHashBuilder,
};
pub use heap::{PriorityQueue, PriorityQueueLink};
pub use key::{HashedKey, hash_key};
pub use link::{Adapter, link_of, link_of_mut};
pub use map::{Map, MapLink};
pub use storage::{Full, Storage, VecStorage};
