//! Matching satellite observation times to model output times.
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;

#[derive(Debug, thiserror::Error)]
pub enum TimeMatchError {
    #[error("No model times to match against")]
    Empty,
    #[error("Model times must be strictly increasing, but time {0} is not after the previous one")]
    NotSorted(usize),
}

/// For each satellite time, find the index of the closest model time.
///
/// `model_times` must be strictly increasing. An observation exactly halfway between two
/// model times is matched to the earlier one. If `max_offset` is given, observations
/// farther than that from every model time get `None`.
pub fn get_closest_time(
    model_times: &[DateTime<Utc>],
    sat_times: &[DateTime<Utc>],
    max_offset: Option<Duration>,
) -> Result<Vec<Option<usize>>, TimeMatchError> {
    if model_times.is_empty() {
        return Err(TimeMatchError::Empty);
    }
    if let Some(i) = model_times.iter().tuple_windows().position(|(a, b)| b <= a) {
        return Err(TimeMatchError::NotSorted(i + 1));
    }

    let matches = sat_times
        .iter()
        .map(|&t| {
            let i = closest_index(model_times, t);
            let offset = (t - model_times[i]).abs();
            match max_offset {
                Some(max) if offset > max => None,
                _ => Some(i),
            }
        })
        .collect();
    Ok(matches)
}

fn closest_index(times: &[DateTime<Utc>], t: DateTime<Utc>) -> usize {
    // First model time at or after t
    let after = times.partition_point(|&m| m < t);
    if after == 0 {
        0
    } else if after == times.len() {
        times.len() - 1
    } else {
        let before = after - 1;
        if t - times[before] <= times[after] - t {
            before
        } else {
            after
        }
    }
}
