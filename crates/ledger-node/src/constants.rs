pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub(crate) const BLOCKS_PER_BATCH: u32 = 25;
pub(crate) const MAX_BLOCKS_PER_REQUEST: u32 = BLOCKS_PER_BATCH * 10;
