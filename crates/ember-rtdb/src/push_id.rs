//! Chronologically ordered push ids.
//!
//! A push id is 20 characters: 8 encode the millisecond timestamp in a
//! 64-symbol alphabet whose ASCII order matches its numeric order, then 12
//! random characters. Ids generated in the same millisecond reuse the
//! previous random tail incremented by one, so lexicographic order always
//! follows generation order.

use std::sync::Mutex;

use ember_types::lock;
use rand::RngExt;

use crate::prelude::*;

/// 64 symbols in ascending ASCII order.
const PUSH_ALPHABET: &[u8; 64] =
	b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIMESTAMP_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

struct PushState {
	last_time: u64,
	last_rand: [u8; RANDOM_CHARS],
}

static STATE: Mutex<PushState> =
	Mutex::new(PushState { last_time: 0, last_rand: [0; RANDOM_CHARS] });

/// Generate the next push id for the current clock reading.
pub(crate) fn next_push_id(now_millis: u64) -> EmResult<String> {
	let mut state = lock!(STATE, "push id state")?;
	Ok(generate(now_millis, &mut state))
}

fn generate(now_millis: u64, state: &mut PushState) -> String {
	if now_millis == state.last_time {
		// Same millisecond: increment the previous random tail so the new
		// id still sorts after it.
		for slot in state.last_rand.iter_mut().rev() {
			if *slot == 63 {
				*slot = 0;
			} else {
				*slot += 1;
				break;
			}
		}
	} else {
		let mut rng = rand::rng();
		for slot in &mut state.last_rand {
			*slot = rng.random_range(0..64) as u8;
		}
		state.last_time = now_millis;
	}

	let mut id = String::with_capacity(TIMESTAMP_CHARS + RANDOM_CHARS);
	let mut time = now_millis;
	let mut time_chars = [0u8; TIMESTAMP_CHARS];
	for slot in time_chars.iter_mut().rev() {
		*slot = (time % 64) as u8;
		time /= 64;
	}
	for index in time_chars {
		id.push(PUSH_ALPHABET[index as usize] as char);
	}
	for index in state.last_rand {
		id.push(PUSH_ALPHABET[index as usize] as char);
	}
	id
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fresh_state() -> PushState {
		PushState { last_time: 0, last_rand: [0; RANDOM_CHARS] }
	}

	#[test]
	fn test_length_and_charset() {
		let mut state = fresh_state();
		let id = generate(1_700_000_000_000, &mut state);
		assert_eq!(id.len(), 20);
		assert!(id.bytes().all(|b| PUSH_ALPHABET.contains(&b)));
	}

	#[test]
	fn test_later_timestamp_sorts_after() {
		let mut state = fresh_state();
		let a = generate(1_700_000_000_000, &mut state);
		let b = generate(1_700_000_000_001, &mut state);
		assert!(b > a);
	}

	#[test]
	fn test_same_millisecond_stays_ordered() {
		let mut state = fresh_state();
		let mut previous = generate(1_700_000_000_000, &mut state);
		for _ in 0..100 {
			let next = generate(1_700_000_000_000, &mut state);
			assert!(next > previous);
			previous = next;
		}
	}

	#[test]
	fn test_random_tail_carry() {
		let mut state = fresh_state();
		let _ = generate(42, &mut state);
		state.last_rand = [63; RANDOM_CHARS];
		let id = generate(42, &mut state);
		// All-63 tail wraps to all zeros
		assert!(id.ends_with(&"-".repeat(RANDOM_CHARS)));
	}

	#[test]
	fn test_timestamp_prefix_is_base64_of_millis() {
		let mut state = fresh_state();
		let id = generate(0, &mut state);
		assert!(id.starts_with(&"-".repeat(TIMESTAMP_CHARS)));
	}
}

// vim: ts=4
