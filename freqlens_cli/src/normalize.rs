use freqlens::Signal;
use tracing::{info, warn};

/// Scales `reference` so that its overall RMS matches `track`.
///
/// A silent or empty reference has no level to match and comes back as-is.
pub fn match_rms(track: &Signal, reference: &Signal) -> Signal {
    let (Ok(track_rms), Ok(reference_rms)) =
        (freqlens::rms(track.samples()), freqlens::rms(reference.samples()))
    else {
        warn!("cannot normalise an empty track");
        return reference.clone();
    };

    if reference_rms == 0.0 {
        warn!("reference is silent, leaving it unnormalised");
        return reference.clone();
    }

    let gain = track_rms / reference_rms;
    info!(gain_db = 20.0 * gain.log10(), "normalised reference loudness");
    reference.with_gain(gain)
}
