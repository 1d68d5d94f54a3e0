// Per-mutation rollback
// Reverses one mutation of an id-keyed collection without touching entries changed since

/// Entry of a collection keyed by a unique id
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Inverse of a single mutation whose write failed
#[derive(Debug, Clone, PartialEq)]
pub enum Undo<T> {
    /// Put back an entry that was removed from `index`
    Reinsert { index: usize, item: T },
    /// Take out an entry that was inserted
    Discard { id: String },
    /// Put back entries that were cleared, ahead of anything added since
    Restore(Vec<T>),
}

impl<T: Keyed> Undo<T> {
    /// Apply to the current collection. Entries whose id is already present are left alone.
    pub fn apply(self, items: &mut Vec<T>) {
        match self {
            Undo::Reinsert { index, item } => {
                if !items.iter().any(|existing| existing.key() == item.key()) {
                    let index = index.min(items.len());
                    items.insert(index, item);
                }
            }
            Undo::Discard { id } => items.retain(|existing| existing.key() != id),
            Undo::Restore(cleared) => {
                let mut restored: Vec<T> = cleared
                    .into_iter()
                    .filter(|item| !items.iter().any(|existing| existing.key() == item.key()))
                    .collect();
                restored.append(items);
                *items = restored;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry(&'static str, u32);

    impl Keyed for Entry {
        fn key(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_reinsert_keeps_later_additions() {
        let mut items = vec![Entry("a", 1), Entry("c", 1)];

        Undo::Reinsert {
            index: 1,
            item: Entry("b", 2),
        }
        .apply(&mut items);

        assert_eq!(items, vec![Entry("a", 1), Entry("b", 2), Entry("c", 1)]);
    }

    #[test]
    fn test_reinsert_skips_readded_entry() {
        let mut items = vec![Entry("b", 5)];

        Undo::Reinsert {
            index: 0,
            item: Entry("b", 2),
        }
        .apply(&mut items);

        assert_eq!(items, vec![Entry("b", 5)]);
    }

    #[test]
    fn test_reinsert_index_clamped() {
        let mut items = Vec::new();

        Undo::Reinsert {
            index: 3,
            item: Entry("a", 1),
        }
        .apply(&mut items);

        assert_eq!(items, vec![Entry("a", 1)]);
    }

    #[test]
    fn test_discard_only_touches_its_id() {
        let mut items = vec![Entry("a", 1), Entry("b", 1)];

        Undo::Discard { id: "a".to_string() }.apply(&mut items);

        assert_eq!(items, vec![Entry("b", 1)]);
    }

    #[test]
    fn test_restore_precedes_new_entries() {
        let mut items = vec![Entry("x", 1), Entry("a", 9)];

        Undo::Restore(vec![Entry("a", 1), Entry("b", 1)]).apply(&mut items);

        assert_eq!(items, vec![Entry("b", 1), Entry("x", 1), Entry("a", 9)]);
    }
}
