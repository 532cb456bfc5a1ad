use crate::lexer::{Category, LogicalOp, RedirectOp, SeparatorOp, Token};
use crate::syntax::{self, SyntaxError};
use crate::tree::{NextMode, Node, OutMode};

/// Tokens that end the right-hand side of a `|`.
const PIPE_STOPS: [Category; 2] = [
    Category::Logical(LogicalOp::And),
    Category::Logical(LogicalOp::Or),
];

struct TreeBuilder<'a> {
    tokens: &'a [Token],
    /// Index of the next unconsumed token.
    pos: usize,
}

impl<'a> TreeBuilder<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        TreeBuilder { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    /// Text of the operand following a redirection operator. Consumes both.
    fn take_operand(&mut self) -> Option<String> {
        let operand = self.tokens.get(self.pos + 1).map(|t| t.to_string());
        self.pos += 2;
        operand
    }

    /// Parses one stage: words, redirections and the structure hanging off it.
    /// Stops without consuming at `;`, `&`, `)`, end of input, or any
    /// category in `stops`.
    fn parse_stage(&mut self, stops: &[Category]) -> Node {
        let mut node = Node::default();

        while let Some(token) = self.peek() {
            let category = token.category();
            if stops.contains(&category) {
                break;
            }
            match category {
                Category::Redirect(RedirectOp::In) => {
                    node.infile = self.take_operand();
                }
                Category::Redirect(op) => {
                    node.outfile = self.take_operand();
                    node.outmode = match op {
                        RedirectOp::OutAppend => OutMode::Append,
                        _ => OutMode::Truncate,
                    };
                }
                Category::Logical(LogicalOp::Pipe) => {
                    self.pos += 1;
                    node.pipe_to = Some(Box::new(self.parse_stage(&PIPE_STOPS)));
                }
                Category::Logical(op) => {
                    self.pos += 1;
                    node.next = Some(Box::new(self.parse_stage(&[])));
                    node.next_mode = match op {
                        LogicalOp::Or => NextMode::OnFailure,
                        _ => NextMode::OnSuccess,
                    };
                }
                Category::Separator(SeparatorOp::Seq) => break,
                Category::Separator(SeparatorOp::Background) => {
                    node.background = true;
                    break;
                }
                Category::LParen => {
                    self.pos += 1;
                    node.subshell = Some(Box::new(self.parse_group()));
                }
                Category::RParen => break,
                Category::Word => {
                    node.argv.push(token.to_string());
                    self.pos += 1;
                }
            }
        }

        node
    }

    /// Parses a stage and everything sequenced after it, up to and including
    /// a closing `)` or to the end of input.
    fn parse_group(&mut self) -> Node {
        let stage = self.parse_stage(&[]);

        if self.peek().map(Token::category) == Some(Category::RParen) {
            self.pos += 1;
            return stage;
        }
        if self.pos + 1 < self.tokens.len() {
            // skip the separator that ended the stage
            self.pos += 1;
            return Node {
                subshell: Some(Box::new(stage)),
                next: Some(Box::new(self.parse_group())),
                ..Node::default()
            };
        }
        stage
    }
}

/// Validates `tokens` and builds the command tree for them.
///
/// An empty token list gives the empty tree. Building itself cannot fail
/// once validation passed.
pub fn build_tree(tokens: &[Token]) -> Result<Node, SyntaxError> {
    syntax::check(tokens)?;
    if tokens.is_empty() {
        return Ok(Node::default());
    }
    Ok(TreeBuilder::new(tokens).parse_group())
}
