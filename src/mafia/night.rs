//! Night resolution.
//!
//! Order is fixed: heals first, then the single merged kill, then
//! investigations. The function is pure over its inputs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::roles::{ActionKind, Role};
use super::session::{NightAction, Player};
use crate::core::game::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Suspicious,
    Innocent,
}

impl Verdict {
    pub const fn of(role: Role) -> Self {
        match role {
            Role::Killer => Self::Suspicious,
            _ => Self::Innocent,
        }
    }
}

/// Private result addressed to one investigator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigation {
    pub investigator: PlayerId,
    pub target: PlayerId,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NightResult {
    pub deaths: Vec<PlayerId>,
    /// Everyone a healer protected, attacked or not. Only the host log sees
    /// this; players learn of a heal through `saved`.
    pub healed: Vec<PlayerId>,
    /// The protected victim of the kill, if the heal mattered
    pub saved: Vec<PlayerId>,
    pub investigations: Vec<Investigation>,
    /// Public lines; never names a healer, investigator or investigated player
    pub narrative: Vec<String>,
}

/// Actions from missing, dead or mis-roled actors are ignored.
fn effective<'a>(
    actions: &'a [NightAction],
    roster: &'a [Player],
    kind: ActionKind,
) -> impl Iterator<Item = &'a NightAction> + 'a {
    actions.iter().filter(move |a| {
        a.kind == kind
            && roster
                .iter()
                .any(|p| p.id == a.actor && p.is_alive && p.role.and_then(Role::night_action) == Some(kind))
            && roster.iter().any(|p| p.id == a.target && p.is_alive)
    })
}

/// Picks the single victim: the target most killers chose, ties going to
/// whoever sits earliest in the roster.
fn merged_victim(actions: &[NightAction], roster: &[Player]) -> Option<PlayerId> {
    let mut tally: BTreeMap<PlayerId, usize> = BTreeMap::new();
    for a in effective(actions, roster, ActionKind::Kill) {
        *tally.entry(a.target).or_default() += 1;
    }
    let best = tally.values().copied().max()?;
    roster
        .iter()
        .map(|p| p.id)
        .find(|id| tally.get(id) == Some(&best))
}

pub fn resolve(actions: &[NightAction], roster: &[Player]) -> NightResult {
    let name_of = |id: PlayerId| {
        roster
            .iter()
            .find(|p| p.id == id)
            .map_or_else(|| id.to_string(), |p| p.name.clone())
    };
    let mut result = NightResult::default();

    // 1. heals
    let protected: BTreeSet<PlayerId> = effective(actions, roster, ActionKind::Heal)
        .map(|a| a.target)
        .collect();
    result.healed = roster.iter().map(|p| p.id).filter(|id| protected.contains(id)).collect();

    // 2. the kill
    match merged_victim(actions, roster) {
        Some(victim) if protected.contains(&victim) => {
            result.saved.push(victim);
            result
                .narrative
                .push("Someone was attacked in the night, but a healer got there first.".into());
        }
        Some(victim) => {
            result.deaths.push(victim);
            result
                .narrative
                .push(format!("{} was found dead this morning.", name_of(victim)));
        }
        None => result.narrative.push("The night passed quietly. Nobody died.".into()),
    }

    // 3. investigations, judged on the roles as they stood at nightfall
    for a in effective(actions, roster, ActionKind::Investigate) {
        let Some(role) = roster.iter().find(|p| p.id == a.target).and_then(|p| p.role) else {
            continue;
        };
        result.investigations.push(Investigation {
            investigator: a.actor,
            target: a.target,
            verdict: Verdict::of(role),
        });
    }
    if !result.investigations.is_empty() {
        result
            .narrative
            .push("The investigator quietly looked into someone.".into());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn player(id: u32, role: Role) -> Player {
        Player {
            id: PlayerId(id),
            connection: Uuid::new_v4(),
            name: format!("p{id}"),
            is_host: id == 1,
            is_alive: true,
            is_connected: true,
            is_ready: false,
            role: Some(role),
        }
    }

    fn table() -> Vec<Player> {
        vec![
            player(1, Role::Killer),
            player(2, Role::Killer),
            player(3, Role::Healer),
            player(4, Role::Investigator),
            player(5, Role::Townsperson),
            player(6, Role::Townsperson),
        ]
    }

    fn act(actor: u32, kind: ActionKind, target: u32) -> NightAction {
        NightAction { actor: PlayerId(actor), kind, target: PlayerId(target) }
    }

    #[test]
    fn unprotected_victim_dies() {
        let r = resolve(&[act(1, ActionKind::Kill, 5)], &table());
        assert_eq!(r.deaths, vec![PlayerId(5)]);
        assert!(r.saved.is_empty());
        assert_eq!(r.narrative, vec!["p5 was found dead this morning.".to_string()]);
    }

    #[test]
    fn healed_and_killed_survives() {
        let r = resolve(&[act(1, ActionKind::Kill, 5), act(3, ActionKind::Heal, 5)], &table());
        assert!(r.deaths.is_empty());
        assert_eq!(r.saved, vec![PlayerId(5)]);
        assert_eq!(r.healed, vec![PlayerId(5)]);
    }

    #[test]
    fn heal_only_is_recorded_without_changing_death_narrative() {
        let with_heal = resolve(&[act(1, ActionKind::Kill, 5), act(3, ActionKind::Heal, 6)], &table());
        let without = resolve(&[act(1, ActionKind::Kill, 5)], &table());
        assert_eq!(with_heal.healed, vec![PlayerId(6)]);
        assert!(with_heal.saved.is_empty());
        assert_eq!(with_heal.deaths, without.deaths);
        assert_eq!(with_heal.narrative, without.narrative);
    }

    #[test]
    fn agreeing_killers_produce_one_death() {
        let r = resolve(&[act(1, ActionKind::Kill, 6), act(2, ActionKind::Kill, 6)], &table());
        assert_eq!(r.deaths, vec![PlayerId(6)]);
    }

    #[test]
    fn split_killers_resolve_to_one_deterministic_victim() {
        let actions = [act(1, ActionKind::Kill, 6), act(2, ActionKind::Kill, 5)];
        let r = resolve(&actions, &table());
        assert_eq!(r.deaths, vec![PlayerId(5)], "tie goes to the earliest seat");
        let mut reversed = actions;
        reversed.reverse();
        assert_eq!(resolve(&reversed, &table()), r);
    }

    #[test]
    fn plurality_beats_roster_order() {
        let mut roster = table();
        roster.push(player(7, Role::Killer));
        let actions = [
            act(1, ActionKind::Kill, 5),
            act(2, ActionKind::Kill, 6),
            act(7, ActionKind::Kill, 6),
        ];
        assert_eq!(resolve(&actions, &roster).deaths, vec![PlayerId(6)]);
    }

    #[test]
    fn investigation_is_private_and_anonymous() {
        let r = resolve(&[act(4, ActionKind::Investigate, 1), act(1, ActionKind::Kill, 6)], &table());
        assert_eq!(
            r.investigations,
            vec![Investigation { investigator: PlayerId(4), target: PlayerId(1), verdict: Verdict::Suspicious }]
        );
        for line in &r.narrative {
            assert!(!line.contains("p4") && !line.contains("p1"), "leaked: {line}");
        }

        let r = resolve(&[act(4, ActionKind::Investigate, 3)], &table());
        assert_eq!(r.investigations[0].verdict, Verdict::Innocent);
    }

    #[test]
    fn several_investigators_share_one_narrative_line() {
        let mut roster = table();
        roster.push(player(7, Role::Investigator));
        let r = resolve(
            &[act(4, ActionKind::Investigate, 1), act(7, ActionKind::Investigate, 5)],
            &roster,
        );
        assert_eq!(r.investigations.len(), 2);
        assert_eq!(
            r.narrative,
            vec![
                "The night passed quietly. Nobody died.".to_string(),
                "The investigator quietly looked into someone.".to_string(),
            ]
        );
    }

    #[test]
    fn killed_investigator_still_learns_result() {
        let r = resolve(&[act(1, ActionKind::Kill, 4), act(4, ActionKind::Investigate, 2)], &table());
        assert_eq!(r.deaths, vec![PlayerId(4)]);
        assert_eq!(r.investigations.len(), 1);
    }

    #[test]
    fn actions_from_wrong_roles_or_the_dead_are_ignored() {
        let mut roster = table();
        roster[0].is_alive = false;
        let r = resolve(
            &[act(1, ActionKind::Kill, 5), act(5, ActionKind::Kill, 6), act(3, ActionKind::Kill, 6)],
            &roster,
        );
        assert!(r.deaths.is_empty());
    }

    #[test]
    fn no_actions_is_a_quiet_night() {
        let r = resolve(&[], &table());
        assert_eq!(r, NightResult {
            narrative: vec!["The night passed quietly. Nobody died.".into()],
            ..NightResult::default()
        });
    }

    #[test]
    fn same_inputs_same_outputs() {
        let actions = [
            act(1, ActionKind::Kill, 5),
            act(3, ActionKind::Heal, 3),
            act(4, ActionKind::Investigate, 2),
        ];
        assert_eq!(resolve(&actions, &table()), resolve(&actions, &table()));
    }
}
