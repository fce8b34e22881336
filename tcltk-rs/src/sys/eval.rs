//! Script evaluator.
//!
//! Implements the word rules of the command language: commands separated by
//! newlines or `;`, words separated by blanks, `{…}` literal words, `"…"`
//! words with substitution, `$name` / `${name}` / `$name(index)` variable
//! substitution, `[script]` command substitution, backslash sequences and
//! `#` comments at command position.
//!
//! A word that consists of exactly one substitution keeps the substituted
//! object itself instead of flattening it to a string, so list and integer
//! representations survive `set y $x`.

use super::heap::{self, ObjPtr};
use super::interp::{self, InterpPtr, Status};
use super::parse::backslash_subst;

enum WordError {
    /// Message for the interpreter result; the status is `Error`.
    Message(String),
    /// A command completed with a non-OK status.
    Status(Status),
}

/// Held words of one command; released when dropped.
struct Words(Vec<ObjPtr>);

impl Drop for Words {
    fn drop(&mut self) {
        for &p in &self.0 {
            heap::decr_ref_count(p);
        }
    }
}

/// Accumulates one word.  `Obj` holds a reference.
enum WordBuf {
    Empty,
    Obj(ObjPtr),
    Text(String),
}

impl WordBuf {
    fn push_str(&mut self, s: &str) {
        if s.is_empty() {
            if let WordBuf::Empty = self {
                *self = WordBuf::Text(String::new());
            }
            return;
        }
        match self {
            WordBuf::Empty => *self = WordBuf::Text(s.to_owned()),
            WordBuf::Text(t) => t.push_str(s),
            WordBuf::Obj(p) => {
                let p = *p;
                let mut text = heap::get_string(p);
                heap::decr_ref_count(p);
                text.push_str(s);
                *self = WordBuf::Text(text);
            }
        }
    }

    fn push_char(&mut self, c: char) {
        self.push_str(c.encode_utf8(&mut [0; 4]));
    }

    fn push_obj(&mut self, p: ObjPtr) {
        if let WordBuf::Empty = self {
            heap::incr_ref_count(p);
            *self = WordBuf::Obj(p);
        } else {
            self.push_str(&heap::get_string(p));
        }
    }

    /// Finish the word as a held object.
    fn finish(self) -> ObjPtr {
        match self {
            WordBuf::Obj(p) => p,
            WordBuf::Text(t) => held(heap::new_string_obj(&t)),
            WordBuf::Empty => held(heap::new_string_obj("")),
        }
    }

    fn into_string(self) -> String {
        match self {
            WordBuf::Empty => String::new(),
            WordBuf::Text(t) => t,
            WordBuf::Obj(p) => {
                let s = heap::get_string(p);
                heap::decr_ref_count(p);
                s
            }
        }
    }

    fn release(self) {
        if let WordBuf::Obj(p) = self {
            heap::decr_ref_count(p);
        }
    }
}

fn held(p: ObjPtr) -> ObjPtr {
    heap::incr_ref_count(p);
    p
}

struct Evaluator<'a> {
    interp: InterpPtr,
    src: &'a str,
    pos: usize,
}

impl<'a> Evaluator<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    /// Run commands until end of input.  The last command's result stays
    /// in the interpreter.
    fn run(&mut self) -> Result<(), WordError> {
        interp::reset_result(self.interp);
        loop {
            while let Some(b' ' | b'\t' | b'\r' | b'\n' | b';') = self.peek() {
                self.pos += 1;
            }
            if self.peek() == Some(b'\\') && self.peek_at(1) == Some(b'\n') {
                self.skip_blanks();
                continue;
            }
            match self.peek() {
                None => return Ok(()),
                Some(b'#') => {
                    self.skip_comment();
                    continue;
                }
                _ => {}
            }
            let words = self.parse_command()?;
            if words.0.is_empty() {
                continue;
            }
            let status = interp::eval_objv(self.interp, &words.0, 0);
            drop(words);
            if status != Status::Ok {
                return Err(WordError::Status(status));
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.src.len());
    }

    /// Skip blanks and backslash-newline sequences between words.
    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => self.pos += 1,
                Some(b'\\') if self.peek_at(1) == Some(b'\n') => self.pos += 2,
                _ => return,
            }
        }
    }

    fn at_word_end(&self) -> bool {
        match self.peek() {
            None | Some(b' ' | b'\t' | b'\r' | b'\n' | b';') => true,
            Some(b'\\') => self.peek_at(1) == Some(b'\n'),
            _ => false,
        }
    }

    fn parse_command(&mut self) -> Result<Words, WordError> {
        let mut words = Words(Vec::new());
        loop {
            self.skip_blanks();
            match self.peek() {
                None => break,
                Some(b'\n' | b';') => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            let mut buf = WordBuf::Empty;
            match self.fill_word(&mut buf) {
                Ok(()) => words.0.push(buf.finish()),
                Err(e) => {
                    buf.release();
                    return Err(e);
                }
            }
        }
        Ok(words)
    }

    fn fill_word(&mut self, buf: &mut WordBuf) -> Result<(), WordError> {
        match self.peek() {
            Some(b'{') => self.braced(buf),
            Some(b'"') => self.quoted(buf),
            _ => {
                while !self.at_word_end() {
                    self.substitute_one(buf)?;
                }
                Ok(())
            }
        }
    }

    fn braced(&mut self, buf: &mut WordBuf) -> Result<(), WordError> {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut depth = 1;
        let mut i = self.pos + 1;
        let mut seg = i;
        let mut text = String::new();
        loop {
            match bytes.get(i) {
                None => return Err(WordError::Message("missing close-brace".to_owned())),
                Some(b'\\') if bytes.get(i + 1) == Some(&b'\n') => {
                    text.push_str(&src[seg..i]);
                    text.push(' ');
                    i += 2;
                    while let Some(b' ' | b'\t') = bytes.get(i) {
                        i += 1;
                    }
                    seg = i;
                }
                Some(b'\\') => i += 2,
                Some(b'{') => {
                    depth += 1;
                    i += 1;
                }
                Some(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    i += 1;
                }
                Some(_) => i += 1,
            }
        }
        text.push_str(&src[seg..i]);
        self.pos = i + 1;
        if !self.at_word_end() {
            return Err(WordError::Message(
                "extra characters after close-brace".to_owned(),
            ));
        }
        buf.push_str(&text);
        Ok(())
    }

    fn quoted(&mut self, buf: &mut WordBuf) -> Result<(), WordError> {
        self.pos += 1;
        loop {
            match self.peek() {
                None => return Err(WordError::Message("missing \"".to_owned())),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.substitute_one(buf)?,
            }
        }
        if !self.at_word_end() {
            return Err(WordError::Message(
                "extra characters after close-quote".to_owned(),
            ));
        }
        buf.push_str("");
        Ok(())
    }

    /// Consume one character, substitution or backslash sequence.
    fn substitute_one(&mut self, buf: &mut WordBuf) -> Result<(), WordError> {
        match self.peek() {
            Some(b'$') => self.variable(buf),
            Some(b'[') => {
                // The whole body must parse before any of it runs.
                let close = bracket_end(self.src, self.pos + 1).map_err(WordError::Message)?;
                let mut inner = Evaluator {
                    interp: self.interp,
                    src: &self.src[..close],
                    pos: self.pos + 1,
                };
                inner.run()?;
                self.pos = close + 1;
                buf.push_obj(interp::get_obj_result(self.interp));
                Ok(())
            }
            Some(b'\\') => {
                let (text, next) = backslash_subst(self.src, self.pos);
                buf.push_str(&text);
                self.pos = next;
                Ok(())
            }
            Some(_) => {
                let c = self.src[self.pos..].chars().next().unwrap_or_default();
                buf.push_char(c);
                self.pos += c.len_utf8();
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn variable(&mut self, buf: &mut WordBuf) -> Result<(), WordError> {
        let src = self.src;
        let bytes = src.as_bytes();
        let start = self.pos + 1;
        let (name, mut end) = if bytes.get(start) == Some(&b'{') {
            let close = src[start..]
                .find('}')
                .ok_or_else(|| WordError::Message("missing close-brace for variable name".to_owned()))?;
            (&src[start + 1..start + close], start + close + 1)
        } else {
            let mut end = start;
            loop {
                match bytes.get(end) {
                    Some(b) if b.is_ascii_alphanumeric() || *b == b'_' => end += 1,
                    Some(b':') if bytes.get(end + 1) == Some(&b':') => end += 2,
                    _ => break,
                }
            }
            (&src[start..end], end)
        };
        if name.is_empty() && bytes.get(start) != Some(&b'{') {
            buf.push_char('$');
            self.pos = start;
            return Ok(());
        }

        let mut index = None;
        if bytes.get(start) != Some(&b'{') && bytes.get(end) == Some(&b'(') {
            self.pos = end + 1;
            let mut ib = WordBuf::Empty;
            let scanned = self.index_into(&mut ib);
            let text = ib.into_string();
            scanned?;
            index = Some(text);
            end = self.pos;
        }
        self.pos = end;

        match interp::get_var(self.interp, name, index.as_deref()) {
            Ok(p) => {
                buf.push_obj(p);
                Ok(())
            }
            Err(msg) => Err(WordError::Message(msg)),
        }
    }

    fn index_into(&mut self, ib: &mut WordBuf) -> Result<(), WordError> {
        loop {
            match self.peek() {
                None => return Err(WordError::Message("missing )".to_owned())),
                Some(b')') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.substitute_one(ib)?,
            }
        }
    }
}

// ── Command substitution bounds ───────────────────────────────────────────────

/// Index of the `]` closing a command substitution whose body starts at
/// `start`.  Checks the body's word syntax without evaluating anything.
fn bracket_end(src: &str, start: usize) -> Result<usize, String> {
    let bytes = src.as_bytes();
    let mut i = start;
    let mut command_start = true;
    let mut word_start = true;
    loop {
        let Some(&b) = bytes.get(i) else {
            return Err("missing close-bracket".to_owned());
        };
        match b {
            b']' => return Ok(i),
            b' ' | b'\t' | b'\r' => {
                word_start = true;
                i += 1;
                continue;
            }
            b'\n' | b';' => {
                command_start = true;
                word_start = true;
                i += 1;
                continue;
            }
            b'\\' if bytes.get(i + 1) == Some(&b'\n') => {
                word_start = true;
                i += 2;
                continue;
            }
            b'#' if command_start => {
                i = comment_end(bytes, i);
                continue;
            }
            b'{' if word_start => {
                i = brace_end(bytes, i)?;
                expect_word_end(bytes, i, "close-brace")?;
            }
            b'"' if word_start => {
                i = quote_end(src, i)?;
                expect_word_end(bytes, i, "close-quote")?;
            }
            _ => i = token_end(src, i)?,
        }
        command_start = false;
        word_start = false;
    }
}

/// Position after one character, backslash sequence or substitution.
fn token_end(src: &str, i: usize) -> Result<usize, String> {
    let bytes = src.as_bytes();
    match bytes.get(i) {
        Some(b'\\') => Ok(i + 2),
        Some(b'[') => Ok(bracket_end(src, i + 1)? + 1),
        Some(b'$') if bytes.get(i + 1) == Some(&b'{') => src[i + 2..]
            .find('}')
            .map(|close| i + 2 + close + 1)
            .ok_or_else(|| "missing close-brace for variable name".to_owned()),
        _ => Ok(i + 1),
    }
}

fn quote_end(src: &str, open: usize) -> Result<usize, String> {
    let mut i = open + 1;
    loop {
        match src.as_bytes().get(i) {
            None => return Err("missing \"".to_owned()),
            Some(b'"') => return Ok(i + 1),
            Some(_) => i = token_end(src, i)?,
        }
    }
}

fn brace_end(bytes: &[u8], open: usize) -> Result<usize, String> {
    let mut depth = 1;
    let mut i = open + 1;
    loop {
        match bytes.get(i) {
            None => return Err("missing close-brace".to_owned()),
            Some(b'\\') => i += 2,
            Some(b'{') => {
                depth += 1;
                i += 1;
            }
            Some(b'}') => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            Some(_) => i += 1,
        }
    }
}

fn comment_end(bytes: &[u8], mut i: usize) -> usize {
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'\n' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

fn expect_word_end(bytes: &[u8], i: usize, after: &str) -> Result<(), String> {
    match bytes.get(i) {
        None | Some(b' ' | b'\t' | b'\r' | b'\n' | b';' | b']') => Ok(()),
        Some(b'\\') if bytes.get(i + 1) == Some(&b'\n') => Ok(()),
        Some(_) => Err(format!("extra characters after {after}")),
    }
}

/// Evaluate a complete script at top level.
///
/// `return` completes normally; `break` and `continue` outside a loop are
/// errors.
pub(super) fn eval_script(interp: InterpPtr, script: &str) -> Status {
    let mut ev = Evaluator { interp, src: script, pos: 0 };
    match ev.run() {
        Ok(()) | Err(WordError::Status(Status::Return)) => Status::Ok,
        Err(WordError::Status(Status::Break)) => {
            interp::set_string_result(interp, "invoked \"break\" outside of a loop");
            Status::Error
        }
        Err(WordError::Status(Status::Continue)) => {
            interp::set_string_result(interp, "invoked \"continue\" outside of a loop");
            Status::Error
        }
        Err(WordError::Status(s)) => s,
        Err(WordError::Message(msg)) => {
            interp::set_string_result(interp, &msg);
            Status::Error
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(interp: InterpPtr, script: &str) -> (Status, String) {
        let status = eval_script(interp, script);
        (status, heap::get_string(interp::get_obj_result(interp)))
    }

    #[test]
    fn words_and_substitution() {
        let i = interp::create_interp();
        assert_eq!(eval(i, "set x 5; set y \"<$x>\""), (Status::Ok, "<5>".to_owned()));
        assert_eq!(eval(i, "set z {$x [no]}"), (Status::Ok, "$x [no]".to_owned()));
        assert_eq!(eval(i, "set w [set x]$x"), (Status::Ok, "55".to_owned()));
        interp::delete_interp(i);
    }

    #[test]
    fn single_substitution_keeps_object() {
        let i = interp::create_interp();
        eval(i, "set l [list a b]");
        eval(i, "set m $l");
        let l = interp::get_var(i, "l", None).unwrap();
        let m = interp::get_var(i, "m", None).unwrap();
        assert_eq!(l, m);
        interp::delete_interp(i);
    }

    #[test]
    fn array_element_with_substituted_index() {
        let i = interp::create_interp();
        assert_eq!(eval(i, "set k 1; set arr($k) 789; set arr(1)").1, "789");
        assert_eq!(eval(i, "set ${k}"), (Status::Error, "can't read \"1\": no such variable".to_owned()));
        assert_eq!(eval(i, "set ${k}x 2; set 1x"), (Status::Ok, "2".to_owned()));
        interp::delete_interp(i);
    }

    #[test]
    fn comments_and_newlines() {
        let i = interp::create_interp();
        let script = "# leading comment\nset a 1\n  # another \\\n continued\nset b 2";
        assert_eq!(eval(i, script), (Status::Ok, "2".to_owned()));
        interp::delete_interp(i);
    }

    #[test]
    fn syntax_errors() {
        let i = interp::create_interp();
        assert_eq!(eval(i, "set a {x").0, Status::Error);
        assert_eq!(eval(i, "set a {x}y"), (Status::Error, "extra characters after close-brace".to_owned()));
        assert_eq!(eval(i, "set a [set b"), (Status::Error, "missing close-bracket".to_owned()));
        assert_eq!(eval(i, "set a $nope"), (Status::Error, "can't read \"nope\": no such variable".to_owned()));
        interp::delete_interp(i);
    }

    #[test]
    fn unterminated_substitution_runs_nothing() {
        let i = interp::create_interp();
        eval(i, "set x 0");
        assert_eq!(eval(i, "set a [incr x"), (Status::Error, "missing close-bracket".to_owned()));
        assert_eq!(eval(i, "set a [incr x; set b {y]"), (Status::Error, "missing close-brace".to_owned()));
        assert_eq!(
            eval(i, "set a [incr x; set b {y}z]"),
            (Status::Error, "extra characters after close-brace".to_owned())
        );
        assert_eq!(eval(i, "set a [incr x; set b \"y]"), (Status::Error, "missing \"".to_owned()));
        assert_eq!(eval(i, "set x"), (Status::Ok, "0".to_owned()));
        assert!(interp::get_var(i, "a", None).is_err());
        interp::delete_interp(i);
    }

    #[test]
    fn close_bracket_inside_words() {
        let i = interp::create_interp();
        assert_eq!(eval(i, "set a [set b {x]y}]"), (Status::Ok, "x]y".to_owned()));
        assert_eq!(eval(i, "set a [set b \"p]q\"]"), (Status::Ok, "p]q".to_owned()));
        assert_eq!(eval(i, "set a [list [set b 1] \\]]"), (Status::Ok, "1 {]}".to_owned()));
        assert_eq!(eval(i, "set a [# note ]\nset b 7]"), (Status::Ok, "7".to_owned()));
        assert_eq!(eval(i, "set a x]"), (Status::Ok, "x]".to_owned()));
        interp::delete_interp(i);
    }

    #[test]
    fn lone_dollar_is_literal() {
        let i = interp::create_interp();
        assert_eq!(eval(i, "set a $"), (Status::Ok, "$".to_owned()));
        interp::delete_interp(i);
    }

    #[test]
    fn return_stops_script() {
        let i = interp::create_interp();
        assert_eq!(eval(i, "set a 1; return done; set a 2"), (Status::Ok, "done".to_owned()));
        assert_eq!(interp::get_var(i, "a", None).map(heap::get_string), Ok("1".to_owned()));
        assert_eq!(eval(i, "break").0, Status::Error);
        interp::delete_interp(i);
    }

    #[test]
    fn evaluation_does_not_leak() {
        let i = interp::create_interp();
        eval(i, "set a 1");
        let before = heap::live_objects();
        eval(i, "set a [list x [set a] {y z}]; set b $a; set a(1) q");
        eval(i, "unset b");
        eval(i, "set a 1");
        assert_eq!(heap::live_objects(), before);
        interp::delete_interp(i);
    }
}
