pub mod msg;
pub mod render;
pub mod subscription;

/// The channel set is fixed and client-side; rooms are not stored
/// entities, only a namespace for message collections.
#[derive(Debug, PartialEq, Eq)]
pub struct Room {
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

pub const DEFAULT_ROOM: &str = "general";

pub const ROOMS: [Room; 5] = [
    Room { name: "general", icon: "fa-comments", description: "General discussion for everyone" },
    Room { name: "tech", icon: "fa-code", description: "Talk about technology and coding" },
    Room { name: "random", icon: "fa-random", description: "Random thoughts and fun conversations" },
    Room { name: "gaming", icon: "fa-gamepad", description: "Discuss your favorite games" },
    Room { name: "music", icon: "fa-music", description: "Share and discover music" },
];

pub fn find(name: &str) -> Option<&'static Room> {
    ROOMS.iter().find(|room| room.name == name)
}

impl Room {
    pub fn collection(&self) -> String {
        format!("rooms/{}/messages", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_default_room_exists() {
        assert!(find(DEFAULT_ROOM).is_some());
    }

    #[test]
    fn lookup_by_name() {
        let tech = find("tech").unwrap();
        assert_eq!(tech.icon, "fa-code");
        assert_eq!(tech.collection(), "rooms/tech/messages");
        assert!(find("lounge").is_none());
    }
}
