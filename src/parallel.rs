//! Parallel frame fetching.
//!
//! A [`StreamHandle`] is a single decoder position and cannot be shared, so
//! [`fetch_frames_parallel`] opens one handle per worker. Requested frames
//! are grouped into runs of nearby indices; each run is decoded sequentially
//! on one handle, where consecutive indices avoid seeking.

use std::path::Path;

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
    config::OpenOptions,
    diagnostics::{emit, path_label},
    error::FrameSeekError,
    handle::{FetchedFrame, StreamHandle},
    timecode::TimecodeKind,
};

/// Frames closer together than this are decoded on the same handle.
const RUN_GAP: i64 = 30;

/// Fetch `frame_indices` from the file at `path` using rayon's thread pool.
///
/// Indices are sorted and deduplicated. Results come back in ascending
/// frame order.
///
/// # Errors
///
/// Returns the first error any worker hits, including open errors.
pub fn fetch_frames_parallel<P: AsRef<Path>>(
    path: P,
    frame_indices: &[i64],
    options: &OpenOptions,
) -> Result<Vec<FetchedFrame>, FrameSeekError> {
    let mut sorted = frame_indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.is_empty() {
        return Ok(Vec::new());
    }

    let path = path.as_ref();
    let runs = split_into_runs(&sorted, RUN_GAP);
    let log = options.fetch_log(&path_label(path));
    emit!(
        log,
        Debug,
        "frameseek::fetch",
        "fetching {} frames in {} parallel runs",
        sorted.len(),
        runs.len()
    );

    let results: Result<Vec<Vec<FetchedFrame>>, FrameSeekError> = runs
        .into_par_iter()
        .map(|run| {
            let mut handle = StreamHandle::open(path, options.clone())?;
            handle.fetch_frames(&run, TimecodeKind::None)
        })
        .collect();

    let mut frames: Vec<FetchedFrame> = results?.into_iter().flatten().collect();
    frames.sort_by_key(|frame| frame.frame_index);
    Ok(frames)
}

/// Split sorted indices into runs whose neighbours differ by at most `gap`.
fn split_into_runs(sorted: &[i64], gap: i64) -> Vec<Vec<i64>> {
    let mut runs: Vec<Vec<i64>> = Vec::new();
    for &frame_index in sorted {
        match runs.last_mut() {
            Some(run) if run.last().is_some_and(|&last| frame_index - last <= gap) => run.push(frame_index),
            _ => runs.push(vec![frame_index]),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_frames_share_a_run() {
        let runs = split_into_runs(&[0, 1, 2, 30, 100, 101, 200], RUN_GAP);
        assert_eq!(runs, vec![vec![0, 1, 2, 30], vec![100, 101], vec![200]]);
    }

    #[test]
    fn empty_input_has_no_runs() {
        assert!(split_into_runs(&[], RUN_GAP).is_empty());
    }
}
