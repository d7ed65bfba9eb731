use crate::message::GroupOrder;

const ID_MASK: u64 = (1 << 21) - 1;

// If the group order is oldest first, lower group ids take precedence.
// Otherwise the bits are flipped so higher group ids take precedence.
fn group_bits(order: GroupOrder, group: u64) -> u64 {
	let group = group & ID_MASK;
	match order {
		GroupOrder::OldestFirst => group,
		_ => ID_MASK - group,
	}
}

/// Pack the scheduling inputs into a single 64-bit stream priority.
///
/// The transport schedules streams by comparing these values, which sorts by:
/// (1) subscriber priority, (2) publisher priority, (3) group id in the
/// configured order, (4) lowest subgroup id.
///
/// Layout: 6 reserved bits | 8 subscriber priority | 8 publisher priority |
/// 21 group order bits | 21 subgroup bits.
pub fn stream_priority(
	group: u64,
	subgroup: u64,
	subscriber_priority: u8,
	publisher_priority: u8,
	order: GroupOrder,
) -> u64 {
	((subscriber_priority as u64) << 50)
		| ((publisher_priority as u64) << 42)
		| (group_bits(order, group) << 21)
		| (subgroup & ID_MASK)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn packing() {
		let priority = stream_priority(5, 3, 0x10, 0x20, GroupOrder::OldestFirst);
		assert_eq!(priority, (0x10 << 50) | (0x20 << 42) | (5 << 21) | 3);

		let priority = stream_priority(5, 3, 0x10, 0x20, GroupOrder::NewestFirst);
		assert_eq!(priority, (0x10 << 50) | (0x20 << 42) | ((ID_MASK - 5) << 21) | 3);
	}

	#[test]
	fn group_truncation() {
		// Only the low 21 bits of the group id participate.
		let a = stream_priority(1, 0, 0, 0, GroupOrder::OldestFirst);
		let b = stream_priority(1 + (1 << 21), 0, 0, 0, GroupOrder::OldestFirst);
		assert_eq!(a, b);
	}

	#[test]
	fn ordering() {
		// The packed value sorts identically to the priority tuple.
		let tuples = [
			(0u8, 0u8, 0u64, 0u64),
			(0, 0, 0, 1),
			(0, 0, 1, 0),
			(0, 1, 0, 0),
			(1, 0, 0, 0),
			(2, 9, 4, 7),
		];

		for a in tuples {
			for b in tuples {
				let pa = stream_priority(a.2, a.3, a.0, a.1, GroupOrder::OldestFirst);
				let pb = stream_priority(b.2, b.3, b.0, b.1, GroupOrder::OldestFirst);
				assert_eq!(a.cmp(&b), pa.cmp(&pb), "a={:?} b={:?}", a, b);
			}
		}
	}

	#[test]
	fn newest_first_flips_groups() {
		let old = stream_priority(5, 0, 0, 0, GroupOrder::NewestFirst);
		let new = stream_priority(9, 0, 0, 0, GroupOrder::NewestFirst);
		assert!(new < old);
	}

	#[test]
	fn default_order_flips_groups() {
		// Anything other than oldest-first flips, including the default.
		assert_eq!(
			stream_priority(5, 3, 0x10, 0x20, GroupOrder::Default),
			stream_priority(5, 3, 0x10, 0x20, GroupOrder::NewestFirst)
		);

		let old = stream_priority(5, 0, 0, 0, GroupOrder::Default);
		let new = stream_priority(9, 0, 0, 0, GroupOrder::Default);
		assert!(new < old);
	}
}
