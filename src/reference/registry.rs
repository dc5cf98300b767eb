use crate::capability::BlockRegistry;

use super::block::{BasicBlock, AIR_ID, IRON_ORE_ID};

/// Resolves the fixed [`BasicBlock`] palette by id. Ids past the
/// palette's end fall back to `None`, matching the "unknown id ->
/// None -> caller substitutes air" contract in [`BlockRegistry::resolve`].
pub struct StaticBlockRegistry;

impl BlockRegistry for StaticBlockRegistry {
    type State = BasicBlock;

    fn air(&self) -> BasicBlock {
        BasicBlock::new(AIR_ID)
    }

    fn resolve(&self, id: u8) -> Option<BasicBlock> {
        if id <= IRON_ORE_ID {
            Some(BasicBlock::new(id))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_resolves_to_none() {
        let registry = StaticBlockRegistry;
        assert!(registry.resolve(200).is_none());
        assert_eq!(registry.resolve(0), Some(registry.air()));
    }
}
