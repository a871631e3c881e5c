use serde::{Deserialize, Serialize};

use archive_types::{Message, Roster, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingOptions {
    /// Start a new group at every reply, even from the same author, so the
    /// reply preview has a header to hang from.
    pub split_on_reply: bool,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            split_on_reply: true,
        }
    }
}

/// A run of consecutive messages shown under one author header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageGroup {
    pub author: User,
    /// Never empty.
    pub messages: Vec<Message>,
}

impl MessageGroup {
    fn open(message: Message, roster: &Roster) -> Self {
        Self {
            author: roster.user_or_placeholder(&message.author_id),
            messages: vec![message],
        }
    }

    fn continues_with(&self, message: &Message, options: GroupingOptions) -> bool {
        if options.split_on_reply && message.is_reply() {
            return false;
        }
        // Placeholders carry the author id too, so unknown authors still
        // group by identity.
        message.author_id == self.author.id
    }

    pub fn first(&self) -> &Message {
        &self.messages[0]
    }
}

/// Groups over a chronological (oldest first) message sequence.
///
/// Grouping is a partition: flattening the groups yields the input
/// messages in the same order.
#[derive(Debug, Clone, Default)]
pub struct MessageGroups {
    groups: Vec<MessageGroup>,
    options: GroupingOptions,
}

impl MessageGroups {
    pub fn new(options: GroupingOptions) -> Self {
        Self {
            groups: Vec::new(),
            options,
        }
    }

    pub fn from_messages<I>(messages: I, roster: &Roster, options: GroupingOptions) -> Self
    where
        I: IntoIterator<Item = Message>,
    {
        let mut groups = Self::new(options);
        for message in messages {
            groups.push(message, roster);
        }
        groups
    }

    /// Append a message newer than everything held.
    pub fn push(&mut self, message: Message, roster: &Roster) {
        match self.groups.last_mut() {
            Some(open) if open.continues_with(&message, self.options) => {
                open.messages.push(message);
            }
            _ => self.groups.push(MessageGroup::open(message, roster)),
        }
    }

    /// Merge a page of messages older than everything held. `older` must be
    /// oldest first. The result equals regrouping the whole sequence.
    pub fn prepend_older(&mut self, older: Vec<Message>, roster: &Roster) {
        if older.is_empty() {
            return;
        }
        debug_assert!(
            self.groups
                .first()
                .zip(older.last())
                .is_none_or(|(g, m)| m.id < g.first().id),
            "prepended page overlaps held messages"
        );

        let mut front = Self::from_messages(older, roster, self.options);
        let mut rest = std::mem::take(&mut self.groups).into_iter();

        if let Some(first) = rest.next() {
            let joins = front
                .groups
                .last()
                .is_some_and(|tail| tail.continues_with(first.first(), self.options));
            match front.groups.last_mut() {
                Some(tail) if joins => tail.messages.extend(first.messages),
                _ => front.groups.push(first),
            }
        }
        front.groups.extend(rest);
        self.groups = front.groups;
    }

    pub fn groups(&self) -> &[MessageGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn into_groups(self) -> Vec<MessageGroup> {
        self.groups
    }

    /// All messages in display order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.groups.iter().flat_map(|g| g.messages.iter())
    }
}

/// Group a chronological message sequence by contiguous author.
pub fn group_messages(
    messages: &[Message],
    roster: &Roster,
    options: GroupingOptions,
) -> Vec<MessageGroup> {
    MessageGroups::from_messages(messages.iter().cloned(), roster, options).into_groups()
}
