//! Static tier table for the community progression ladder.
//!
//! Thresholds are strictly increasing with level, so eligibility checks are a
//! single forward scan. The table is process-wide and read-only.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDef {
    pub level: i64,
    pub name: &'static str,
    pub title: &'static str,
    pub threshold: i64,
    pub color: &'static str,
    pub channels: &'static [&'static str],
    pub perks: &'static [&'static str],
}

pub const LEVELS: [LevelDef; 6] = [
    LevelDef {
        level: 0,
        name: "LOBBY",
        title: "Newcomer",
        threshold: 0,
        color: "#808080",
        channels: &["verification", "introductions", "verdant-chat"],
        perks: &["Can chat with Verdant", "Read-only most channels"],
    },
    LevelDef {
        level: 1,
        name: "SEEDLING",
        title: "Verified Human",
        threshold: 50,
        color: "#90EE90",
        channels: &["lounge", "how-to-help", "wins"],
        perks: &["Can chat in lounge", "Can claim simple tasks"],
    },
    LevelDef {
        level: 2,
        name: "SAPLING",
        title: "Active Builder",
        threshold: 200,
        color: "#32CD32",
        channels: &["task-board", "bug-reports", "tutorials"],
        perks: &["Can claim any task", "Can report bugs", "Voice access"],
    },
    LevelDef {
        level: 3,
        name: "TREE",
        title: "Trusted Builder",
        threshold: 500,
        color: "#228B22",
        channels: &["builders", "architects", "revenue-streams"],
        perks: &["Hub access", "Can assign tasks to others"],
    },
    LevelDef {
        level: 4,
        name: "FOREST",
        title: "Core Team",
        threshold: 1000,
        color: "#006400",
        channels: &["launch-plans", "alerts"],
        perks: &["Financial discussions", "Strategy input"],
    },
    LevelDef {
        level: 5,
        name: "ORACLE",
        title: "Inner Circle",
        threshold: 2500,
        color: "#7c3aed",
        channels: &["command-center", "audit-log", "moderator-only"],
        perks: &["Full access", "Admin capabilities", "Direct comms"],
    },
];

pub fn get(level: i64) -> Option<&'static LevelDef> {
    usize::try_from(level).ok().and_then(|idx| LEVELS.get(idx))
}

/// Fallback definition for unknown levels
pub fn base() -> &'static LevelDef {
    &LEVELS[0]
}

/// Highest level whose threshold is covered by `xp`. Level 0 has threshold 0,
/// so every xp value (including negative penalties) maps to at least level 0.
pub fn eligible_level(xp: i64) -> i64 {
    let mut eligible = 0;
    for def in &LEVELS {
        if xp >= def.threshold {
            eligible = def.level;
        }
    }

    eligible
}

pub fn next_threshold(level: i64) -> Option<i64> {
    get(level + 1).map(|def| def.threshold)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_thresholds_strictly_increase() {
        for pair in LEVELS.windows(2) {
            assert!(pair[0].threshold < pair[1].threshold);
            assert_eq!(pair[0].level + 1, pair[1].level);
        }
    }

    #[test]
    fn test_eligible_level_reference_points() {
        assert_eq!(eligible_level(0), 0);
        assert_eq!(eligible_level(49), 0);
        assert_eq!(eligible_level(50), 1);
        assert_eq!(eligible_level(199), 1);
        assert_eq!(eligible_level(2500), 5);
        assert_eq!(eligible_level(999_999), 5);
    }

    #[test]
    fn test_eligible_level_is_monotonic() {
        let mut prev = eligible_level(-100);
        for xp in -100..3000 {
            let current = eligible_level(xp);
            assert!(current >= prev, "eligibility regressed at xp={xp}");
            prev = current;
        }
    }

    #[test]
    fn test_negative_xp_stays_in_lobby() {
        assert_eq!(eligible_level(-1), 0);
        assert_eq!(eligible_level(i64::MIN), 0);
    }

    #[test]
    fn test_unknown_level_lookup() {
        assert!(get(6).is_none());
        assert!(get(-1).is_none());
        assert_eq!(base().level, 0);
    }

    #[test]
    fn test_next_threshold() {
        assert_eq!(next_threshold(0), Some(50));
        assert_eq!(next_threshold(4), Some(2500));
        assert_eq!(next_threshold(5), None);
    }

    #[test]
    fn test_level_one_title() {
        assert_eq!(get(1).unwrap().title, "Verified Human");
    }
}
