/// Multiply all values in the given buffer with the given envelope buffer, value by value.
pub fn multiply_buffers(buffer: &mut [f32], envelope: &[f32]) {
    debug_assert_eq!(buffer.len(), envelope.len(), "Buffer sizes must match");
    for (value, env) in buffer.iter_mut().zip(envelope) {
        *value *= *env;
    }
}

// -------------------------------------------------------------------------------------------------

/// Add the given planar stereo buffers, scaled by the given left and right gains, into an
/// interleaved output buffer with `channel_count` channels.
///
/// A mono output receives the average of both gain-scaled channels. The planar buffers' length
/// defines the number of frames that are written.
pub fn add_stereo_to_interleaved(
    left: &[f32],
    right: &[f32],
    (left_gain, right_gain): (f32, f32),
    interleaved: &mut [f32],
    channel_count: usize,
) {
    debug_assert_eq!(left.len(), right.len(), "Buffer sizes must match");
    debug_assert!(
        interleaved.len() >= left.len() * channel_count,
        "Interleaved buffer too small"
    );
    match channel_count {
        1 => {
            for (o, (l, r)) in interleaved.iter_mut().zip(left.iter().zip(right.iter())) {
                *o += (*l * left_gain + *r * right_gain) * 0.5;
            }
        }
        2 => {
            for (frame, (l, r)) in interleaved
                .chunks_exact_mut(2)
                .zip(left.iter().zip(right.iter()))
            {
                frame[0] += *l * left_gain;
                frame[1] += *r * right_gain;
            }
        }
        _ => {
            // surround layouts: fill the front left/right channels only
            for (frame, (l, r)) in interleaved
                .chunks_exact_mut(channel_count)
                .zip(left.iter().zip(right.iter()))
            {
                frame[0] += *l * left_gain;
                frame[1] += *r * right_gain;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
