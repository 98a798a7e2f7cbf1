pub use smallvec::{smallvec, SmallVec};

pub mod hashmap {
    pub type HashMap<K, V> = hashbrown::HashMap<K, V, foldhash::fast::RandomState>;
}

pub mod hashset {
    pub type HashSet<K> = hashbrown::HashSet<K, foldhash::fast::RandomState>;
}
