mod block_processor;
pub use block_processor::{
    BlockContext, BlockProcessor, BlockProcessorConfig, BlockSource, ObserverHandle,
};
