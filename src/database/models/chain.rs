//! Postponement chain traversal.
//!
//! A chain is stored as rows sharing one root: every non-root row carries
//! `original_event_id = root` and `previous_event_id = <row it replaced>`.
//! [`ChainView`] rebuilds the tree from those rows once and answers the
//! history/latest/branching questions without touching the store again.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::event::CalendarEvent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("postponement chain loops back on event {0}")]
    Cycle(Uuid),
    #[error("postponement chain is deeper than {0} links")]
    TooDeep(usize),
    #[error("event {0} referenced by the chain does not exist")]
    MissingLink(Uuid),
}

/// Guard for walking `original_event_id` pointers upwards
#[derive(Debug)]
pub struct RootWalk {
    visited: HashSet<Uuid>,
    max_depth: usize,
}

impl RootWalk {
    pub fn new(max_depth: usize) -> Self {
        Self { visited: HashSet::new(), max_depth }
    }

    /// Record a visited row; fails on revisits and on overly long walks
    pub fn visit(&mut self, id: Uuid) -> Result<(), ChainError> {
        if !self.visited.insert(id) {
            return Err(ChainError::Cycle(id));
        }
        if self.visited.len() > self.max_depth {
            return Err(ChainError::TooDeep(self.max_depth));
        }
        Ok(())
    }
}

/// New link values for one chain member after a deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRelink {
    pub event_id: Uuid,
    pub original_event_id: Option<Uuid>,
    pub previous_event_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ChainView {
    root: CalendarEvent,
    members: HashMap<Uuid, CalendarEvent>,
    /// predecessor id -> ids of rows created by postponing it
    children: HashMap<Uuid, Vec<Uuid>>,
}

impl ChainView {
    /// `members` are the rows whose `original_event_id` is `root.id`.
    /// A member whose predecessor is unknown hangs directly off the root.
    pub fn new(root: CalendarEvent, members: Vec<CalendarEvent>) -> Self {
        let members: HashMap<Uuid, CalendarEvent> = members
            .into_iter()
            .filter(|m| m.id != root.id)
            .map(|m| (m.id, m))
            .collect();

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for member in members.values() {
            let parent = match member.previous_event_id {
                Some(prev) if prev == root.id || members.contains_key(&prev) => prev,
                _ => root.id,
            };
            children.entry(parent).or_default().push(member.id);
        }
        for ids in children.values_mut() {
            ids.sort_by(|a, b| history_order(&members[a], &members[b]));
        }

        Self { root, members, children }
    }

    pub fn root(&self) -> &CalendarEvent {
        &self.root
    }

    pub fn get(&self, id: Uuid) -> Option<&CalendarEvent> {
        if id == self.root.id {
            Some(&self.root)
        } else {
            self.members.get(&id)
        }
    }

    pub fn len(&self) -> usize {
        1 + self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Rows created by postponing `id`, in history order
    pub fn successors(&self, id: Uuid) -> Vec<&CalendarEvent> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|c| self.members.get(c)).collect())
            .unwrap_or_default()
    }

    /// Root first, then depth-first over successors ordered by `postponed_at`
    /// (unpostponed rows last) and `created_at`.
    pub fn history(&self, max_depth: usize) -> Result<Vec<&CalendarEvent>, ChainError> {
        let mut out = Vec::with_capacity(self.len());
        let mut seen = HashSet::new();
        let mut stack = vec![(self.root.id, 0usize)];

        while let Some((id, depth)) = stack.pop() {
            if depth > max_depth {
                return Err(ChainError::TooDeep(max_depth));
            }
            if !seen.insert(id) {
                return Err(ChainError::Cycle(id));
            }
            let event = self.get(id).ok_or(ChainError::MissingLink(id))?;
            out.push(event);
            if let Some(kids) = self.children.get(&id) {
                for kid in kids.iter().rev() {
                    stack.push((*kid, depth + 1));
                }
            }
        }

        // Members linked only among themselves never hang off the root
        if let Some(stray) = self.members.keys().find(|id| !seen.contains(*id)) {
            return Err(ChainError::Cycle(*stray));
        }

        Ok(out)
    }

    pub fn postponement_count(&self, max_depth: usize) -> Result<usize, ChainError> {
        Ok(self.history(max_depth)?.len() - 1)
    }

    /// Most recently created row; ties go to the later history entry
    pub fn latest(&self, max_depth: usize) -> Result<&CalendarEvent, ChainError> {
        let history = self.history(max_depth)?;
        let mut latest = history[0];
        for event in history.into_iter().skip(1) {
            if event.created_at >= latest.created_at {
                latest = event;
            }
        }
        Ok(latest)
    }

    /// Rows postponed more than once. The chain stays ambiguous at these
    /// points; callers decide which branch is current.
    pub fn branch_points(&self) -> Vec<Uuid> {
        let mut points: Vec<Uuid> = self
            .children
            .iter()
            .filter(|(_, kids)| kids.len() > 1)
            .map(|(id, _)| *id)
            .collect();
        points.sort();
        points
    }

    /// Link rewrites that keep the chain well formed once `deleted` is gone.
    pub fn detach(&self, deleted: Uuid, max_depth: usize) -> Result<Vec<ChainRelink>, ChainError> {
        if deleted == self.root.id {
            let history = self.history(max_depth)?;
            let Some(new_root) = history.get(1).map(|e| e.id) else {
                return Ok(Vec::new());
            };
            let mut relinks = vec![ChainRelink {
                event_id: new_root,
                original_event_id: None,
                previous_event_id: None,
            }];
            for member in history.iter().skip(2) {
                let previous = match member.previous_event_id {
                    Some(prev) if prev != self.root.id => Some(prev),
                    _ => Some(new_root),
                };
                relinks.push(ChainRelink {
                    event_id: member.id,
                    original_event_id: Some(new_root),
                    previous_event_id: previous,
                });
            }
            return Ok(relinks);
        }

        let removed = self.members.get(&deleted).ok_or(ChainError::MissingLink(deleted))?;
        let inherited = removed.previous_event_id.unwrap_or(self.root.id);
        Ok(self
            .successors(deleted)
            .into_iter()
            .map(|kid| ChainRelink {
                event_id: kid.id,
                original_event_id: Some(self.root.id),
                previous_event_id: Some(inherited),
            })
            .collect())
    }
}

fn history_order(a: &CalendarEvent, b: &CalendarEvent) -> Ordering {
    match (a.postponed_at, b.postponed_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.created_at.cmp(&b.created_at))
    .then(a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::event::{EventType, NewEvent, PostponeRequest};
    use chrono::{DateTime, Duration, Utc};

    fn root_event(now: DateTime<Utc>) -> CalendarEvent {
        NewEvent {
            case_id: Uuid::new_v4(),
            dispute_id: None,
            event_type: EventType::Hearing,
            title: "Hearing".into(),
            description: String::new(),
            start_datetime: now + Duration::days(1),
            end_datetime: None,
            courtroom: String::new(),
            court_address: String::new(),
            participants: String::new(),
            agenda: String::new(),
            email_notifications: true,
            telegram_notifications: false,
        }
        .into_event(Uuid::new_v4(), now)
    }

    fn postpone(event: &mut CalendarEvent, at: DateTime<Utc>) -> CalendarEvent {
        let req = PostponeRequest {
            new_start: at + Duration::days(3),
            new_end: None,
            reason: "court conflict".into(),
            actor: Uuid::new_v4(),
            at,
        };
        event.mark_postponed(&req);
        event.successor(&req)
    }

    /// A -> B -> C, one minute apart
    fn linear() -> (CalendarEvent, CalendarEvent, CalendarEvent) {
        let t0 = Utc::now();
        let mut a = root_event(t0);
        let mut b = postpone(&mut a, t0 + Duration::minutes(1));
        let c = postpone(&mut b, t0 + Duration::minutes(2));
        (a, b, c)
    }

    #[test]
    fn history_is_root_then_postponements_in_order() {
        let (a, b, c) = linear();
        let view = ChainView::new(a.clone(), vec![c.clone(), b.clone()]);
        let ids: Vec<Uuid> = view.history(64).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(view.postponement_count(64).unwrap(), 2);
        assert_eq!(view.latest(64).unwrap().id, c.id);
        assert!(view.branch_points().is_empty());
    }

    #[test]
    fn history_covers_every_member() {
        let (a, b, c) = linear();
        let view = ChainView::new(a, vec![b, c]);
        assert_eq!(view.history(64).unwrap().len(), view.len());
    }

    #[test]
    fn branching_is_reported_not_resolved() {
        let t0 = Utc::now();
        let mut a = root_event(t0);
        let b = postpone(&mut a.clone(), t0 + Duration::minutes(1));
        let c = postpone(&mut a, t0 + Duration::minutes(2));
        let view = ChainView::new(a.clone(), vec![b.clone(), c.clone()]);
        assert_eq!(view.branch_points(), vec![a.id]);
        assert_eq!(view.latest(64).unwrap().id, c.id);
        assert_eq!(view.history(64).unwrap().len(), 3);
    }

    #[test]
    fn cycle_among_members_is_detected() {
        let (a, mut b, mut c) = linear();
        b.previous_event_id = Some(c.id);
        c.previous_event_id = Some(b.id);
        let view = ChainView::new(a, vec![b, c]);
        assert!(matches!(view.history(64), Err(ChainError::Cycle(_))));
    }

    #[test]
    fn depth_cap_is_enforced() {
        let (a, b, c) = linear();
        let view = ChainView::new(a, vec![b, c]);
        assert_eq!(view.history(1), Err(ChainError::TooDeep(1)));
    }

    #[test]
    fn root_walk_rejects_revisits_and_long_walks() {
        let id = Uuid::new_v4();
        let mut walk = RootWalk::new(8);
        walk.visit(id).unwrap();
        assert_eq!(walk.visit(id), Err(ChainError::Cycle(id)));

        let mut walk = RootWalk::new(2);
        walk.visit(Uuid::new_v4()).unwrap();
        walk.visit(Uuid::new_v4()).unwrap();
        assert_eq!(walk.visit(Uuid::new_v4()), Err(ChainError::TooDeep(2)));
    }

    #[test]
    fn deleting_root_promotes_first_successor() {
        let (a, b, c) = linear();
        let view = ChainView::new(a.clone(), vec![b.clone(), c.clone()]);
        let relinks = view.detach(a.id, 64).unwrap();
        assert_eq!(
            relinks,
            vec![
                ChainRelink { event_id: b.id, original_event_id: None, previous_event_id: None },
                ChainRelink { event_id: c.id, original_event_id: Some(b.id), previous_event_id: Some(b.id) },
            ]
        );
    }

    #[test]
    fn deleting_middle_row_bridges_its_successors() {
        let (a, b, c) = linear();
        let view = ChainView::new(a.clone(), vec![b.clone(), c.clone()]);
        let relinks = view.detach(b.id, 64).unwrap();
        assert_eq!(
            relinks,
            vec![ChainRelink { event_id: c.id, original_event_id: Some(a.id), previous_event_id: Some(a.id) }]
        );
    }

    #[test]
    fn deleting_lone_root_needs_no_relinks() {
        let a = root_event(Utc::now());
        let view = ChainView::new(a.clone(), vec![]);
        assert!(view.detach(a.id, 64).unwrap().is_empty());
    }
}
