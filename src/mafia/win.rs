//! Win evaluation, run after every elimination.

use super::roles::{Faction, Role};
use super::session::Player;

/// Living killers versus everyone else alive. A table with no killers left
/// belongs to the town even when nobody survives.
pub fn evaluate(roster: &[Player]) -> Option<Faction> {
    let living = roster.iter().filter(|p| p.is_alive);
    let (killers, others) = living.fold((0usize, 0usize), |(k, o), p| {
        if p.role == Some(Role::Killer) {
            (k + 1, o)
        } else {
            (k, o + 1)
        }
    });

    if killers == 0 {
        Some(Faction::Town)
    } else if killers >= others {
        Some(Faction::Killers)
    } else {
        None
    }
}

pub fn narrative(winner: Faction) -> &'static str {
    match winner {
        Faction::Killers => "The killers have taken control.",
        Faction::Town => "All killers have been eliminated. The town wins.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::game::PlayerId;
    use uuid::Uuid;

    fn table(killers: u32, others: u32) -> Vec<Player> {
        (1..=killers + others)
            .map(|id| Player {
                id: PlayerId(id),
                connection: Uuid::new_v4(),
                name: format!("p{id}"),
                is_host: id == 1,
                is_alive: true,
                is_connected: true,
                is_ready: false,
                role: Some(if id <= killers { Role::Killer } else { Role::Townsperson }),
            })
            .collect()
    }

    #[test]
    fn outnumbered_killers_keep_playing() {
        assert_eq!(evaluate(&table(2, 3)), None);
    }

    #[test]
    fn parity_hands_killers_the_win() {
        assert_eq!(evaluate(&table(2, 2)), Some(Faction::Killers));
        assert_eq!(evaluate(&table(1, 0)), Some(Faction::Killers));
    }

    #[test]
    fn no_living_killers_is_a_town_win() {
        let mut roster = table(1, 3);
        roster[0].is_alive = false;
        assert_eq!(evaluate(&roster), Some(Faction::Town));
    }

    #[test]
    fn empty_table_goes_to_the_town() {
        let mut roster = table(1, 1);
        roster.iter_mut().for_each(|p| p.is_alive = false);
        assert_eq!(evaluate(&roster), Some(Faction::Town));
    }

    #[test]
    fn dead_town_members_count_for_nothing() {
        let mut roster = table(2, 4);
        roster[4].is_alive = false;
        roster[5].is_alive = false;
        assert_eq!(evaluate(&roster), Some(Faction::Killers));
    }
}
