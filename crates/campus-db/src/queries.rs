use crate::Database;
use crate::migrations::NOW;
use crate::models::{
    AnonymousTrustMessageRow, CommentRow, LikeRow, NewPost, PollOptionRow, PollRow,
    PostDetailRows, PostRow, TrustMessageRow, UserRow,
};
use anyhow::Result;
use campus_types::models::Role;
use rusqlite::{Connection, Row, TransactionBehavior, params, params_from_iter};
use tracing::warn;

const POST_COLUMNS: &str = "p.id, p.user_id, COALESCE(u.username, 'unknown'), p.category, p.text,
     p.image_urls, p.file_url, p.file_name, p.youtube_url, p.link_preview, p.created_at";

const ANONYMOUS_TRUST_COLUMNS: &str =
    "id, content, reply, is_answered, created_at, replied_at";

impl Database {
    // -- Users --

    /// Insert a user. Returns `None` when the email is already registered; the
    /// UNIQUE constraint decides, so two racing registrations cannot both win.
    pub fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (email, username, password, role) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(email) DO NOTHING",
                params![email, username, password_hash, role.as_str()],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    /// Stored role of a user, `None` if the user does not exist.
    pub fn get_user_role(&self, id: i64) -> Result<Option<Role>> {
        self.with_conn(|conn| {
            let role: Option<String> = conn
                .query_row("SELECT role FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(role.and_then(|r| {
                let parsed = Role::from_db(&r);
                if parsed.is_none() {
                    warn!("Unknown role '{}' on user {}", r, id);
                }
                parsed
            }))
        })
    }

    // -- Posts --

    /// Insert a post together with its poll in one transaction: either the
    /// post, the poll and every option land, or nothing does.
    pub fn insert_post(&self, post: &NewPost) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let image_urls = if post.image_urls.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&post.image_urls)?)
            };

            tx.execute(
                "INSERT INTO posts (user_id, category, text, image_urls, file_url, file_name, youtube_url, link_preview)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    post.user_id,
                    post.category,
                    post.text,
                    image_urls,
                    post.file_url,
                    post.file_name,
                    post.youtube_url,
                    post.link_preview,
                ],
            )?;
            let post_id = tx.last_insert_rowid();

            if let Some(poll) = &post.poll {
                tx.execute(
                    "INSERT INTO polls (post_id, question) VALUES (?1, ?2)",
                    params![post_id, poll.question],
                )?;
                let poll_id = tx.last_insert_rowid();
                for option in &poll.options {
                    tx.execute(
                        "INSERT INTO poll_options (poll_id, text, votes) VALUES (?1, ?2, 0)",
                        params![poll_id, option],
                    )?;
                }
            }

            tx.commit()?;
            Ok(post_id)
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN users u ON p.user_id = u.id WHERE p.id = ?1"
            );
            let row = conn.query_row(&sql, [id], map_post_row).optional()?;
            Ok(row)
        })
    }

    /// Posts newest first, optionally restricted to one author.
    pub fn list_posts(&self, author_id: Option<i64>) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            // JOIN users to fetch the author username in a single query
            let rows = match author_id {
                Some(author_id) => {
                    let sql = format!(
                        "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN users u ON p.user_id = u.id
                         WHERE p.user_id = ?1 ORDER BY p.created_at DESC, p.id DESC"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map([author_id], map_post_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!(
                        "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN users u ON p.user_id = u.id
                         ORDER BY p.created_at DESC, p.id DESC"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map([], map_post_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Batch-fetch likes, comments, polls and poll options for a set of posts.
    pub fn get_post_details(&self, post_ids: &[i64]) -> Result<PostDetailRows> {
        if post_ids.is_empty() {
            return Ok(PostDetailRows::default());
        }

        self.with_conn(|conn| {
            let ids = placeholders(post_ids.len());

            let mut stmt = conn.prepare(&format!(
                "SELECT id, post_id, user_id FROM likes WHERE post_id IN ({ids}) ORDER BY id"
            ))?;
            let likes = stmt
                .query_map(params_from_iter(post_ids), |row| {
                    Ok(LikeRow {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        user_id: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(&format!(
                "SELECT c.id, c.post_id, c.user_id, COALESCE(u.username, 'unknown'), c.text, c.created_at
                 FROM comments c
                 LEFT JOIN users u ON c.user_id = u.id
                 WHERE c.post_id IN ({ids})
                 ORDER BY c.created_at ASC, c.id ASC"
            ))?;
            let comments = stmt
                .query_map(params_from_iter(post_ids), map_comment_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(&format!(
                "SELECT id, post_id, question FROM polls WHERE post_id IN ({ids})"
            ))?;
            let polls = stmt
                .query_map(params_from_iter(post_ids), |row| {
                    Ok(PollRow {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        question: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let options = if polls.is_empty() {
                Vec::new()
            } else {
                let poll_ids: Vec<i64> = polls.iter().map(|p| p.id).collect();
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, poll_id, text, votes FROM poll_options
                     WHERE poll_id IN ({}) ORDER BY id",
                    placeholders(poll_ids.len())
                ))?;
                stmt.query_map(params_from_iter(&poll_ids), map_option_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            Ok(PostDetailRows {
                likes,
                comments,
                polls,
                options,
            })
        })
    }

    /// Delete a post and everything that hangs off it. Returns false if the
    /// post did not exist.
    pub fn delete_post(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM likes WHERE post_id = ?1", [id])?;
            tx.execute("DELETE FROM comments WHERE post_id = ?1", [id])?;
            tx.execute(
                "DELETE FROM poll_options WHERE poll_id IN (SELECT id FROM polls WHERE post_id = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM polls WHERE post_id = ?1", [id])?;
            let deleted = tx.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    // -- Polls --

    /// Add one vote to an option. The increment happens inside SQLite, so
    /// concurrent voters never lose updates. `None` if the option is unknown.
    pub fn vote_option(&self, option_id: i64) -> Result<Option<PollOptionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "UPDATE poll_options SET votes = votes + 1 WHERE id = ?1
                     RETURNING id, poll_id, text, votes",
                    [option_id],
                    map_option_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Comments --

    /// Insert a comment. `None` if the post does not exist.
    pub fn insert_comment(&self, post_id: i64, user_id: i64, text: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            if !post_exists(conn, post_id)? {
                return Ok(None);
            }
            conn.execute(
                "INSERT INTO comments (post_id, user_id, text) VALUES (?1, ?2, ?3)",
                params![post_id, user_id, text],
            )?;
            let id = conn.last_insert_rowid();
            query_comment(conn, id)
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    // -- Likes --

    /// Toggle a like: removes it if present, inserts it if not.
    /// Returns `Some(true)` when the caller now likes the post, `Some(false)`
    /// when the like was removed, and `None` if the post does not exist.
    ///
    /// Runs as an IMMEDIATE transaction and relies on UNIQUE(post_id, user_id),
    /// so a (post, user) pair can never hold two rows.
    pub fn toggle_like(&self, post_id: i64, user_id: i64) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !post_exists(&tx, post_id)? {
                return Ok(None);
            }

            let removed = tx.execute(
                "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id, user_id],
            )?;
            let liked = if removed > 0 {
                false
            } else {
                tx.execute(
                    "INSERT INTO likes (post_id, user_id) VALUES (?1, ?2)
                     ON CONFLICT(post_id, user_id) DO NOTHING",
                    params![post_id, user_id],
                )?;
                true
            };

            tx.commit()?;
            Ok(Some(liked))
        })
    }

    // -- Trust box --

    pub fn insert_trust_message(&self, user_id: i64, content: &str) -> Result<TrustMessageRow> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                "INSERT INTO trust_messages (user_id, content) VALUES (?1, ?2)
                 RETURNING id, user_id, content, reply, is_answered, created_at, replied_at",
                params![user_id, content],
                map_trust_row,
            )?;
            Ok(row)
        })
    }

    /// All messages written by `user_id`, newest first.
    pub fn list_trust_messages_for_owner(&self, user_id: i64) -> Result<Vec<TrustMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, content, reply, is_answered, created_at, replied_at
                 FROM trust_messages
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_trust_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every message, newest first, without the author column.
    pub fn list_trust_messages_anonymous(&self) -> Result<Vec<AnonymousTrustMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ANONYMOUS_TRUST_COLUMNS} FROM trust_messages ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([], map_anonymous_trust_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Store an admin reply and mark the message answered. A later reply
    /// overwrites the earlier one. `None` if the message does not exist.
    pub fn reply_trust_message(&self, id: i64, reply: &str) -> Result<Option<AnonymousTrustMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE trust_messages SET reply = ?2, is_answered = 1, replied_at = {NOW}
                 WHERE id = ?1
                 RETURNING {ANONYMOUS_TRUST_COLUMNS}"
            );
            let row = conn
                .query_row(&sql, params![id, reply], map_anonymous_trust_row)
                .optional()?;
            Ok(row)
        })
    }
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

fn post_exists(conn: &Connection, post_id: i64) -> Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
        [post_id],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

fn query_user(conn: &Connection, predicate: &str, value: &dyn rusqlite::ToSql) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, username, password, role, created_at FROM users WHERE {predicate}"
    );
    let row = conn
        .query_row(&sql, [value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                username: row.get(2)?,
                password: row.get(3)?,
                role: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_comment(conn: &Connection, id: i64) -> Result<Option<CommentRow>> {
    let row = conn
        .query_row(
            "SELECT c.id, c.post_id, c.user_id, COALESCE(u.username, 'unknown'), c.text, c.created_at
             FROM comments c
             LEFT JOIN users u ON c.user_id = u.id
             WHERE c.id = ?1",
            [id],
            map_comment_row,
        )
        .optional()?;
    Ok(row)
}

fn map_post_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    let id: i64 = row.get(0)?;
    let image_urls = match row.get::<_, Option<String>>(5)? {
        Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("Corrupt image_urls on post {}: {}", id, e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    Ok(PostRow {
        id,
        user_id: row.get(1)?,
        username: row.get(2)?,
        category: row.get(3)?,
        text: row.get(4)?,
        image_urls,
        file_url: row.get(6)?,
        file_name: row.get(7)?,
        youtube_url: row.get(8)?,
        link_preview: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn map_comment_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_option_row(row: &Row<'_>) -> rusqlite::Result<PollOptionRow> {
    Ok(PollOptionRow {
        id: row.get(0)?,
        poll_id: row.get(1)?,
        text: row.get(2)?,
        votes: row.get(3)?,
    })
}

fn map_trust_row(row: &Row<'_>) -> rusqlite::Result<TrustMessageRow> {
    Ok(TrustMessageRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        reply: row.get(3)?,
        is_answered: row.get(4)?,
        created_at: row.get(5)?,
        replied_at: row.get(6)?,
    })
}

fn map_anonymous_trust_row(row: &Row<'_>) -> rusqlite::Result<AnonymousTrustMessageRow> {
    Ok(AnonymousTrustMessageRow {
        id: row.get(0)?,
        content: row.get(1)?,
        reply: row.get(2)?,
        is_answered: row.get(3)?,
        created_at: row.get(4)?,
        replied_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPoll;

    fn db_with_users() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice@school.ua", "alice", "hash", Role::User).unwrap().unwrap();
        let bob = db.create_user("bob@school.ua", "bob", "hash", Role::User).unwrap().unwrap();
        (db, alice, bob)
    }

    fn text_post(user_id: i64, text: &str) -> NewPost {
        NewPost {
            user_id,
            category: "Новина".into(),
            text: text.into(),
            image_urls: vec![],
            file_url: None,
            file_name: None,
            youtube_url: None,
            link_preview: None,
            poll: None,
        }
    }

    fn count(db: &Database, sql: &str, id: i64) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [id], |r| r.get(0))?)).unwrap()
    }

    #[test]
    fn user_ids_never_collide_with_sentinel() {
        let (_db, alice, bob) = db_with_users();
        assert!(alice > 0);
        assert!(bob > alice);
    }

    #[test]
    fn duplicate_email_is_rejected_without_second_row() {
        let (db, _, _) = db_with_users();
        let again = db.create_user("alice@school.ua", "alice2", "hash", Role::User).unwrap();
        assert!(again.is_none());

        let rows: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE email = 'alice@school.ua'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn stored_role_lookup() {
        let db = Database::open_in_memory().unwrap();
        let admin = db.create_user("head@school.ua", "head", "hash", Role::Admin).unwrap().unwrap();
        assert_eq!(db.get_user_role(admin).unwrap(), Some(Role::Admin));
        assert_eq!(db.get_user_role(999).unwrap(), None);
    }

    #[test]
    fn like_toggle_follows_call_parity() {
        let (db, alice, bob) = db_with_users();
        let post = db.insert_post(&text_post(alice, "hello")).unwrap();

        for i in 1..=7 {
            let liked = db.toggle_like(post, bob).unwrap().unwrap();
            assert_eq!(liked, i % 2 == 1);
            let rows = count(&db, "SELECT COUNT(*) FROM likes WHERE post_id = ?1", post);
            assert_eq!(rows, if i % 2 == 1 { 1 } else { 0 });
        }
    }

    #[test]
    fn schema_rejects_a_second_like_row() {
        let (db, alice, bob) = db_with_users();
        let post = db.insert_post(&text_post(alice, "hello")).unwrap();
        assert_eq!(db.toggle_like(post, bob).unwrap(), Some(true));

        let dup = db.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT INTO likes (post_id, user_id) VALUES (?1, ?2)",
                params![post, bob],
            )?)
        });
        assert!(dup.is_err());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM likes WHERE post_id = ?1", post), 1);
    }

    #[test]
    fn like_on_missing_post_is_none() {
        let (db, _, bob) = db_with_users();
        assert!(db.toggle_like(42, bob).unwrap().is_none());
    }

    #[test]
    fn posts_list_newest_first_and_filter_by_author() {
        let (db, alice, bob) = db_with_users();
        let first = db.insert_post(&text_post(alice, "first")).unwrap();
        let second = db.insert_post(&text_post(bob, "second")).unwrap();

        let all: Vec<i64> = db.list_posts(None).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(all, vec![second, first]);

        let mine = db.list_posts(Some(alice)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].username, "alice");
    }

    #[test]
    fn image_urls_keep_their_order() {
        let (db, alice, _) = db_with_users();
        let mut post = text_post(alice, "pics");
        post.image_urls = vec!["/uploads/b.png".into(), "/uploads/a.png".into()];
        let id = db.insert_post(&post).unwrap();

        let row = db.get_post(id).unwrap().unwrap();
        assert_eq!(row.image_urls, vec!["/uploads/b.png", "/uploads/a.png"]);
    }

    #[test]
    fn delete_post_removes_dependents() {
        let (db, alice, bob) = db_with_users();
        let mut post = text_post(alice, "vote!");
        post.poll = Some(NewPoll {
            question: "Pizza?".into(),
            options: vec!["yes".into(), "no".into()],
        });
        let id = db.insert_post(&post).unwrap();
        db.insert_comment(id, bob, "nice").unwrap().unwrap();
        db.toggle_like(id, bob).unwrap();

        assert!(db.delete_post(id).unwrap());
        assert!(!db.delete_post(id).unwrap());

        assert_eq!(count(&db, "SELECT COUNT(*) FROM comments WHERE post_id = ?1", id), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM likes WHERE post_id = ?1", id), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM polls WHERE post_id = ?1", id), 0);
        let options: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM poll_options", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(options, 0);
    }

    #[test]
    fn votes_accumulate_without_voter_tracking() {
        let (db, alice, _) = db_with_users();
        let mut post = text_post(alice, "poll");
        post.poll = Some(NewPoll {
            question: "Best day?".into(),
            options: vec!["Mon".into(), "Fri".into()],
        });
        let id = db.insert_post(&post).unwrap();
        let details = db.get_post_details(&[id]).unwrap();
        let first = details.options[0].id;

        db.vote_option(first).unwrap().unwrap();
        let option = db.vote_option(first).unwrap().unwrap();
        assert_eq!(option.votes, 2);
        assert!(db.vote_option(9_999).unwrap().is_none());
    }

    #[test]
    fn comment_on_missing_post_is_none() {
        let (db, alice, _) = db_with_users();
        assert!(db.insert_comment(77, alice, "hello?").unwrap().is_none());
    }

    #[test]
    fn anonymous_listing_and_reply() {
        let (db, alice, bob) = db_with_users();
        let a = db.insert_trust_message(alice, "the stairs are icy").unwrap();
        db.insert_trust_message(bob, "more clubs please").unwrap();

        let all = db.list_trust_messages_anonymous().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id, a.id);

        let replied = db.reply_trust_message(a.id, "salt is on the way").unwrap().unwrap();
        assert!(replied.is_answered);
        assert!(replied.replied_at.is_some());

        let mine = db.list_trust_messages_for_owner(alice).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].reply.as_deref(), Some("salt is on the way"));
        assert!(db.reply_trust_message(404, "nobody").unwrap().is_none());
    }
}
