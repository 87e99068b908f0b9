const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Split `0..ntot` into contiguous `[lb, ub)` blocks for parallel jobs
/// * `ntot` - number of total items
/// * `block_size` - the size of each block (0 falls back to a default)
pub fn create_jobs(ntot: usize, block_size: usize) -> Vec<(usize, usize)> {
    let block_size = if block_size == 0 {
        DEFAULT_BLOCK_SIZE
    } else {
        block_size
    };
    let nblock = ntot.div_ceil(block_size);
    (0..nblock)
        .map(|block| {
            let lb = block * block_size;
            let ub = ((block + 1) * block_size).min(ntot);
            (lb, ub)
        })
        .collect()
}
